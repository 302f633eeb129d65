use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{
        effects::EffectQueueError,
        scene::{SceneError, UnknownScene},
        settings::SettingsError,
        store::StoreError,
    },
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
    /// A background task the request depends on is gone.
    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Degraded => ServiceError::Degraded,
            StoreError::Storage(source) => ServiceError::Unavailable(source),
            StoreError::Timeout(_) => ServiceError::Timeout,
            StoreError::Regression(regression) => ServiceError::InvalidState(regression.to_string()),
            StoreError::Settings(source) => ServiceError::InvalidInput(source.to_string()),
            lost @ StoreError::WriterLost => ServiceError::Internal(lost.to_string()),
        }
    }
}

impl From<SettingsError> for ServiceError {
    fn from(err: SettingsError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl From<SceneError> for ServiceError {
    fn from(err: SceneError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

impl From<EffectQueueError> for ServiceError {
    fn from(err: EffectQueueError) -> Self {
        match err {
            EffectQueueError::AlreadyAttached => ServiceError::InvalidState(err.to_string()),
        }
    }
}

impl From<UnknownScene> for AppError {
    fn from(err: UnknownScene) -> Self {
        AppError::NotFound(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::scene::SceneKind;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn store_failures_map_to_http_statuses() {
        assert_eq!(
            status_of(ServiceError::from(StoreError::Degraded)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ServiceError::from(StoreError::Timeout(
                std::time::Duration::from_secs(5)
            ))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ServiceError::from(StoreError::Settings(
                SettingsError::UnsupportedSession(7)
            ))),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn taken_effect_stream_is_a_conflict() {
        assert_eq!(
            status_of(ServiceError::from(EffectQueueError::AlreadyAttached)),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn unknown_scene_is_not_found() {
        assert_eq!(
            status_of(UnknownScene("volcano".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ServiceError::from(SceneError::Stopped(SceneKind::Map))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
