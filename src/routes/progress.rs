use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::{progress::ProgressResponse, settings::ParentSettingsResponse},
    services::progress_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/progress",
    tag = "progress",
    responses((status = 200, description = "Unlock state and badges", body = ProgressResponse))
)]
/// Return the progress record with its derived values.
pub async fn get_progress(State(state): State<SharedState>) -> Json<ProgressResponse> {
    Json(progress_service::progress(&state))
}

#[utoipa::path(
    get,
    path = "/parent/settings",
    tag = "progress",
    responses((status = 200, description = "Session limits and play time", body = ParentSettingsResponse))
)]
/// Return the parent settings and the play time recorded per day.
pub async fn get_parent_settings(State(state): State<SharedState>) -> Json<ParentSettingsResponse> {
    Json(progress_service::parent_settings(&state))
}

/// Progress and parent settings routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/progress", get(get_progress))
        .route("/parent/settings", get(get_parent_settings))
}
