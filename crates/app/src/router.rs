use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{sse::Sse, IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use fonthost_core::HostingFormView;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{event_stream, keep_alive, SessionEvents};
use crate::feed::BufferFeed;
use crate::problem::ProblemResponse;
use crate::session::{HostingSession, SessionDeps, SessionRegistry};
use crate::{generation, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    deps: SessionDeps,
    sessions: SessionRegistry,
    callback_secret: Arc<[u8]>,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, deps: SessionDeps, callback_secret: Arc<[u8]>) -> Self {
        Self {
            metrics,
            deps,
            sessions: SessionRegistry::new(),
            callback_secret,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn feed(&self) -> &BufferFeed {
        &self.deps.feed
    }

    pub fn callback_secret(&self) -> &[u8] {
        &self.callback_secret
    }

    async fn session(&self, id: Uuid) -> Result<HostingSession, ProblemResponse> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(ProblemResponse::session_not_found)
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/hosting/sessions", post(create_session))
        .route(
            "/api/hosting/sessions/:id",
            get(get_session).delete(delete_session),
        )
        .route("/api/hosting/sessions/:id/domain", put(set_domain))
        .route("/api/hosting/sessions/:id/autocomplete", put(autocomplete))
        .route("/api/hosting/sessions/:id/fonts", post(add_font))
        .route(
            "/api/hosting/sessions/:id/fonts/:font_id",
            delete(remove_font),
        )
        .route(
            "/api/hosting/sessions/:id/fonts/:font_id/resolve",
            post(resolve_conflict),
        )
        .route("/api/hosting/sessions/:id/submit", post(submit))
        .route("/api/hosting/sessions/:id/back", post(back))
        .route("/api/hosting/sessions/:id/events", get(session_events))
        .route("/api/generation/results", post(generation::handle))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    session_id: Uuid,
    form: HostingFormView,
}

#[derive(Debug, Serialize)]
struct ChangeResponse<T: Serialize> {
    #[serde(flatten)]
    change: T,
    form: HostingFormView,
}

#[derive(Debug, Deserialize)]
struct DomainBody {
    domain: String,
}

#[derive(Debug, Deserialize)]
struct AutocompleteBody {
    text: String,
}

#[derive(Debug, Deserialize)]
struct AddFontBody {
    suggestion_id: String,
    variant_id: String,
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionResponse>) {
    counter!("api_requests_total", "route" => "create_session").increment(1);
    let events = SessionEvents::new();
    let session = HostingSession::mount(&state.deps, events.clone(), Arc::new(events));
    state.sessions.insert(session.clone()).await;

    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: session.id(),
            form: session.view().await,
        }),
    )
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ProblemResponse> {
    counter!("api_requests_total", "route" => "get_session").increment(1);
    let session = state.session(id).await?;
    Ok(Json(SessionResponse {
        session_id: id,
        form: session.view().await,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ProblemResponse> {
    counter!("api_requests_total", "route" => "delete_session").increment(1);
    let session = state
        .sessions
        .remove(id)
        .await
        .ok_or_else(ProblemResponse::session_not_found)?;
    session.unmount().await;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_domain(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<DomainBody>,
) -> Result<Json<HostingFormView>, ProblemResponse> {
    counter!("api_requests_total", "route" => "set_domain").increment(1);
    let session = state.session(id).await?;
    session.set_domain(body.domain).await;
    Ok(Json(session.view().await))
}

async fn autocomplete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AutocompleteBody>,
) -> Result<Json<HostingFormView>, ProblemResponse> {
    counter!("api_requests_total", "route" => "autocomplete").increment(1);
    let session = state.session(id).await?;
    session.update_autocomplete(body.text).await;
    Ok(Json(session.view().await))
}

#[derive(Debug, Serialize)]
struct Added {
    added: bool,
}

async fn add_font(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AddFontBody>,
) -> Result<Json<ChangeResponse<Added>>, ProblemResponse> {
    counter!("api_requests_total", "route" => "add_font").increment(1);
    let session = state.session(id).await?;
    let added = session
        .add_font(&body.suggestion_id, &body.variant_id)
        .await?;
    Ok(Json(ChangeResponse {
        change: Added { added },
        form: session.view().await,
    }))
}

#[derive(Debug, Serialize)]
struct Removed {
    removed: usize,
}

async fn remove_font(
    State(state): State<AppState>,
    Path((id, font_id)): Path<(Uuid, String)>,
) -> Result<Json<ChangeResponse<Removed>>, ProblemResponse> {
    counter!("api_requests_total", "route" => "remove_font").increment(1);
    let session = state.session(id).await?;
    let removed = usize::from(session.remove_font(&font_id).await);
    Ok(Json(ChangeResponse {
        change: Removed { removed },
        form: session.view().await,
    }))
}

async fn resolve_conflict(
    State(state): State<AppState>,
    Path((id, font_id)): Path<(Uuid, String)>,
) -> Result<Json<ChangeResponse<Removed>>, ProblemResponse> {
    counter!("api_requests_total", "route" => "resolve_conflict").increment(1);
    let session = state.session(id).await?;
    let removed = session.resolve_conflict(&font_id).await;
    Ok(Json(ChangeResponse {
        change: Removed { removed },
        form: session.view().await,
    }))
}

#[derive(Debug, Serialize)]
struct Submitted {
    submission_id: fonthost_core::SubmissionId,
}

async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ChangeResponse<Submitted>>), ProblemResponse> {
    counter!("api_requests_total", "route" => "submit").increment(1);
    let session = state.session(id).await?;
    let submission_id = session.submit().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ChangeResponse {
            change: Submitted { submission_id },
            form: session.view().await,
        }),
    ))
}

async fn back(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ProblemResponse> {
    counter!("api_requests_total", "route" => "back").increment(1);
    state.session(id).await?.back();
    Ok(StatusCode::ACCEPTED)
}

async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<
    Sse<impl tokio_stream::Stream<Item = Result<axum::response::sse::Event, serde_json::Error>>>,
    ProblemResponse,
> {
    counter!("api_requests_total", "route" => "session_events").increment(1);
    let session = state.session(id).await?;
    Ok(Sse::new(event_stream(session.events())).keep_alive(keep_alive()))
}
