use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
}

impl HealthResponse {
    /// Storage is connected and answering.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    /// Progress is served from memory only; writes are refused.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
        }
    }
}
