use axum::{Json, Router, extract::State, routing::{get, post}};
use axum_valid::Valid;

use crate::{
    dto::session::{ExtendSessionRequest, StartSessionRequest},
    error::AppError,
    services::session_service,
    state::{SharedState, session::SessionStatus},
};

#[utoipa::path(
    get,
    path = "/session",
    tag = "session",
    responses((status = 200, description = "Current play session", body = SessionStatus))
)]
/// Current play session.
pub async fn get_session(State(state): State<SharedState>) -> Json<SessionStatus> {
    Json(session_service::status(&state))
}

#[utoipa::path(
    post,
    path = "/session/start",
    tag = "session",
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "Session started", body = SessionStatus),
        (status = 400, description = "Unsupported session length")
    )
)]
/// Start a play session, ending and recording any running one.
pub async fn start_session(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<StartSessionRequest>>,
) -> Result<Json<SessionStatus>, AppError> {
    Ok(Json(session_service::start(&state, request).await?))
}

#[utoipa::path(
    post,
    path = "/session/pause",
    tag = "session",
    responses((status = 200, description = "Session paused", body = SessionStatus))
)]
/// Stop counting play time until resumed.
pub async fn pause_session(State(state): State<SharedState>) -> Json<SessionStatus> {
    Json(session_service::pause(&state))
}

#[utoipa::path(
    post,
    path = "/session/resume",
    tag = "session",
    responses((status = 200, description = "Session resumed", body = SessionStatus))
)]
/// Continue counting play time.
pub async fn resume_session(State(state): State<SharedState>) -> Json<SessionStatus> {
    Json(session_service::resume(&state))
}

#[utoipa::path(
    post,
    path = "/session/stop",
    tag = "session",
    responses((status = 200, description = "Session ended and play time recorded", body = SessionStatus))
)]
/// End the session and add its play time to today's usage.
pub async fn stop_session(State(state): State<SharedState>) -> Json<SessionStatus> {
    Json(session_service::stop(&state).await)
}

#[utoipa::path(
    post,
    path = "/session/extend",
    tag = "session",
    request_body = ExtendSessionRequest,
    responses(
        (status = 200, description = "Extra play time granted", body = SessionStatus),
        (status = 400, description = "Extension out of range")
    )
)]
/// Grant extra play time, reopening a session that hit its limit.
pub async fn extend_session(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<ExtendSessionRequest>>,
) -> Json<SessionStatus> {
    Json(session_service::extend(&state, request).await)
}

/// Play-session routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/session", get(get_session))
        .route("/session/start", post(start_session))
        .route("/session/pause", post(pause_session))
        .route("/session/resume", post(resume_session))
        .route("/session/extend", post(extend_session))
        .route("/session/stop", post(stop_session))
}
