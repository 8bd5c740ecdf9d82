use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use fonthost_core::{GeneratedBuffer, SubmissionId};
use hmac::{Hmac, Mac};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::feed::FeedDelivery;
use crate::problem::ProblemResponse;
use crate::router::AppState;

pub const HEADER_SIGNATURE: &str = "X-Generator-Signature";

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    submission_id: SubmissionId,
    buffers: Vec<CallbackBuffer>,
}

#[derive(Debug, Deserialize)]
struct CallbackBuffer {
    #[serde(default)]
    font_id: Option<String>,
    data: String,
}

/// Receives generated font binaries from the generator and publishes them on
/// the buffer feed.
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ProblemResponse> {
    let start = Instant::now();
    counter!("api_requests_total", "route" => "generation_results").increment(1);

    let signature = headers
        .get(HEADER_SIGNATURE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ProblemResponse::new(
                StatusCode::BAD_REQUEST,
                "missing_header",
                format!("missing header {HEADER_SIGNATURE}"),
            )
        })?;

    verify_signature(state.callback_secret(), &body, signature).map_err(|err| {
        warn!(stage = "callback", error = %err, "rejected generator callback");
        counter!("generation_invalid_signature_total").increment(1);
        ProblemResponse::new(StatusCode::FORBIDDEN, "invalid_signature", err)
    })?;

    let payload: CallbackPayload = serde_json::from_slice(&body).map_err(|err| {
        ProblemResponse::new(
            StatusCode::BAD_REQUEST,
            "invalid_json",
            format!("failed to parse payload: {err}"),
        )
    })?;

    let mut buffers = Vec::with_capacity(payload.buffers.len());
    for (index, buffer) in payload.buffers.into_iter().enumerate() {
        let data = STANDARD.decode(buffer.data.as_bytes()).map_err(|err| {
            ProblemResponse::new(
                StatusCode::BAD_REQUEST,
                "invalid_buffer",
                format!("buffer {index} is not valid base64: {err}"),
            )
        })?;
        buffers.push(GeneratedBuffer {
            font_id: buffer.font_id,
            data,
        });
    }

    let submission_id = payload.submission_id;
    let buffer_count = buffers.len();
    let delivered = state.feed().publish(FeedDelivery {
        submission_id,
        buffers,
    });
    info!(
        stage = "callback",
        %submission_id,
        buffers = buffer_count,
        delivered,
        latency_ms = start.elapsed().as_secs_f64() * 1000.0,
        "generated buffers received"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "submission_id": submission_id, "delivered": delivered })),
    ))
}

fn verify_signature(secret: &[u8], body: &[u8], provided: &str) -> Result<(), String> {
    let hex_part = provided
        .strip_prefix("sha256=")
        .ok_or_else(|| "signature must start with 'sha256='".to_string())?;
    let provided_bytes =
        hex::decode(hex_part).map_err(|_| "signature is not valid hex".to_string())?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|_| "failed to initialize signature verifier".to_string())?;
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    let expected_bytes: &[u8] = expected.as_ref();

    if expected_bytes.ct_eq(provided_bytes.as_slice()).into() {
        Ok(())
    } else {
        Err("signature mismatch".to_string())
    }
}

#[cfg(test)]
pub(crate) fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("hmac key");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::router::{
        app_router,
        tests::{setup_state, TEST_SECRET},
    };

    fn callback_request(body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/generation/results")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(HEADER_SIGNATURE, signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[test]
    fn signature_verification_detects_tampering() {
        let body = br#"{"submission_id":"x"}"#;
        let signature = sign(b"secret", body);

        assert!(verify_signature(b"secret", body, &signature).is_ok());
        assert!(verify_signature(b"other", body, &signature).is_err());
        assert!(verify_signature(b"secret", b"{}", &signature).is_err());
        assert!(verify_signature(b"secret", body, "md5=abc").is_err());
        assert!(verify_signature(b"secret", body, "sha256=zz").is_err());
    }

    #[tokio::test]
    async fn signed_callback_is_published_on_the_feed() {
        let state = setup_state();
        let mut subscription = state.feed().subscribe();
        let app = app_router(state);

        let submission = SubmissionId::new();
        let body = json!({
            "submission_id": submission,
            "buffers": [{ "font_id": "fam-groteskv-regular", "data": STANDARD.encode([0u8, 1, 0, 0]) }]
        })
        .to_string();
        let response = app
            .oneshot(callback_request(&body, Some(sign(TEST_SECRET, body.as_bytes()))))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let collected = response.into_body().collect().await.expect("body");
        let value: Value = serde_json::from_slice(&collected.to_bytes()).expect("json");
        assert_eq!(value["delivered"], 1);

        let delivery = subscription.recv().await.expect("delivery");
        assert_eq!(delivery.submission_id, submission);
        assert_eq!(
            delivery.buffers,
            vec![GeneratedBuffer {
                font_id: Some("fam-groteskv-regular".to_string()),
                data: vec![0, 1, 0, 0],
            }]
        );
    }

    #[tokio::test]
    async fn unsigned_or_forged_callbacks_are_rejected() {
        let state = setup_state();
        let body = json!({ "submission_id": SubmissionId::new(), "buffers": [] }).to_string();

        let response = app_router(state.clone())
            .oneshot(callback_request(&body, None))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app_router(state)
            .oneshot(callback_request(&body, Some(sign(b"forged", body.as_bytes()))))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn invalid_base64_is_a_bad_request() {
        let state = setup_state();
        let body = json!({
            "submission_id": SubmissionId::new(),
            "buffers": [{ "data": "***" }]
        })
        .to_string();

        let response = app_router(state)
            .oneshot(callback_request(&body, Some(sign(TEST_SECRET, body.as_bytes()))))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
