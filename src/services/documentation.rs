use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Tigerfire Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::progress::get_progress,
        crate::routes::progress::get_parent_settings,
        crate::routes::scene::get_scene,
        crate::routes::scene::post_scene_event,
        crate::routes::session::get_session,
        crate::routes::session::start_session,
        crate::routes::session::pause_session,
        crate::routes::session::resume_session,
        crate::routes::session::extend_session,
        crate::routes::session::stop_session,
        crate::routes::sse::public_stream,
        crate::routes::sse::scene_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::progress::ProgressResponse,
            crate::dto::progress::SceneProgress,
            crate::dto::progress::BadgeView,
            crate::dto::settings::ParentSettingsResponse,
            crate::dto::scene::SceneEventRequest,
            crate::dto::scene::GateActionRequest,
            crate::dto::session::StartSessionRequest,
            crate::dto::session::ExtendSessionRequest,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::ProgressChangedEvent,
            crate::dto::sse::SessionEvent,
            crate::state::effects::Effect,
            crate::state::progress::SceneId,
            crate::state::progress::SceneStatus,
            crate::state::scene::SceneKind,
            crate::state::scene::SceneSnapshot,
            crate::state::scene::GateQuestion,
            crate::state::state_machine::ScenePhase,
            crate::state::session::SessionStatus,
            crate::state::session::SessionState,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "progress", description = "Unlock state, badges and parent settings"),
        (name = "scenes", description = "Scene controllers driven by the presentation layer"),
        (name = "session", description = "Parental-control play session"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
/// OpenAPI document covering every route.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/progress",
            "/parent/settings",
            "/scenes/{scene}",
            "/scenes/{scene}/events",
            "/session/start",
            "/session/extend",
            "/sse/public",
            "/sse/scenes/{scene}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
