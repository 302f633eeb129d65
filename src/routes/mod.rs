use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Liveness and storage status.
pub mod health;
/// Progress and parent settings.
pub mod progress;
/// Scene events and snapshots.
pub mod scene;
/// Play-session control.
pub mod session;
/// Server-sent event streams.
pub mod sse;

/// Compose the REST, SSE and documentation route trees over the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(progress::router())
        .merge(scene::router())
        .merge(session::router())
        .merge(sse::router())
        .merge(swagger_ui())
        .with_state(state)
}

/// Swagger UI at `/docs`, reading the generated document from `/api-doc/openapi.json`.
fn swagger_ui() -> Router<SharedState> {
    SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into()
}
