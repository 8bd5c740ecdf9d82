use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fonthost_core::{FormError, SubmitRejection};
use serde::Serialize;

use crate::session::SessionError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// `application/problem+json` error response.
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn session_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "session_not_found",
            "no hosting session with this id",
        )
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<SessionError> for ProblemResponse {
    fn from(err: SessionError) -> Self {
        let detail = err.to_string();
        match err {
            SessionError::Rejected(SubmitRejection::Pending) => {
                Self::new(StatusCode::CONFLICT, "submission_pending", detail)
            }
            SessionError::Rejected(rejection) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.as_str(), detail)
            }
            SessionError::Form(FormError::Resolve(_)) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "unresolvable_font", detail)
            }
            SessionError::Form(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "unknown_suggestion", detail)
            }
            SessionError::Dispatch(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "generation_dispatch_failed", detail)
            }
        }
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;

    #[test]
    fn session_errors_map_to_statuses() {
        let pending = ProblemResponse::from(SessionError::Rejected(SubmitRejection::Pending));
        assert_eq!(pending.status(), StatusCode::CONFLICT);

        let no_fonts = ProblemResponse::from(SessionError::Rejected(SubmitRejection::NoFonts));
        assert_eq!(no_fonts.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(no_fonts.body.problem_type, "no_fonts");

        let dispatch = ProblemResponse::from(SessionError::Dispatch(BackendError::Unavailable(
            "down".to_string(),
        )));
        assert_eq!(dispatch.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn response_uses_problem_content_type() {
        let response = ProblemResponse::session_not_found().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/problem+json"
        );
    }
}
