use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    error::{AppError, ServiceError},
    services::{scene_service, sse_service},
    state::{SharedState, scene::SceneKind},
};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "Progress, session and storage events", content_type = "text/event-stream", body = String))
)]
/// Stream progress, session and storage-mode changes to any number of clients.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_public(&state);
    info!("New public SSE connection");
    let handshake = sse_service::handshake(&state, "public");
    sse_service::to_sse_stream(receiver, handshake)
}

#[utoipa::path(
    get,
    path = "/sse/scenes/{scene}",
    tag = "sse",
    params(("scene" = String, Path, description = "fire_station, school, forest, map or parent")),
    responses(
        (status = 200, description = "Effects emitted by the scene", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown scene"),
        (status = 409, description = "Another client already consumes this scene")
    )
)]
/// Stream the effects of one scene to its single consumer.
pub async fn scene_stream(
    State(state): State<SharedState>,
    Path(scene): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let kind: SceneKind = scene.parse()?;
    let subscription = scene_service::subscribe_effects(&state, kind).map_err(|err| match err {
        ServiceError::InvalidState(_) => {
            AppError::Conflict(format!("effects of `{kind}` already have a consumer"))
        }
        other => other.into(),
    })?;
    let handshake = sse_service::handshake(&state, kind.as_str());
    Ok(sse_service::effects_to_sse(kind, subscription, handshake))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/public", get(public_stream))
        .route("/sse/scenes/{scene}", get(scene_stream))
}
