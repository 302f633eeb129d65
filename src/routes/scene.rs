use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::scene::SceneEventRequest,
    error::AppError,
    services::scene_service,
    state::{
        SharedState,
        scene::{SceneKind, SceneSnapshot},
    },
};

#[utoipa::path(
    get,
    path = "/scenes/{scene}",
    tag = "scenes",
    params(("scene" = String, Path, description = "fire_station, school, forest, map or parent")),
    responses(
        (status = 200, description = "Current scene state", body = SceneSnapshot),
        (status = 404, description = "Unknown scene")
    )
)]
/// Return the latest snapshot of a scene.
pub async fn get_scene(
    State(state): State<SharedState>,
    Path(scene): Path<String>,
) -> Result<Json<SceneSnapshot>, AppError> {
    let kind: SceneKind = scene.parse()?;
    Ok(Json(scene_service::snapshot(&state, kind)))
}

#[utoipa::path(
    post,
    path = "/scenes/{scene}/events",
    tag = "scenes",
    params(("scene" = String, Path, description = "fire_station, school, forest, map or parent")),
    request_body = SceneEventRequest,
    responses(
        (status = 200, description = "Scene state after the event was handled", body = SceneSnapshot),
        (status = 400, description = "Malformed event"),
        (status = 404, description = "Unknown scene")
    )
)]
/// Deliver a user event to a scene and wait until it is handled.
pub async fn post_scene_event(
    State(state): State<SharedState>,
    Path(scene): Path<String>,
    Valid(Json(event)): Valid<Json<SceneEventRequest>>,
) -> Result<Json<SceneSnapshot>, AppError> {
    let kind: SceneKind = scene.parse()?;
    let snapshot = scene_service::dispatch(&state, kind, event.into()).await?;
    Ok(Json(snapshot))
}

/// Scene event and snapshot routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/scenes/{scene}", get(get_scene))
        .route("/scenes/{scene}/events", post(post_scene_event))
}
