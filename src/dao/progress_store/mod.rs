#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod file;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{ParentSettingsEntity, ProgressEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the persistence layer for the player's progress and parent settings.
pub trait ProgressBackend: Send + Sync {
    /// Read the stored progress record, `None` on a fresh install.
    fn load_progress(&self) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>>;
    /// Replace the stored progress record.
    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Read the stored parent settings, `None` when never saved.
    fn load_settings(&self) -> BoxFuture<'static, StorageResult<Option<ParentSettingsEntity>>>;
    /// Replace the stored parent settings.
    fn save_settings(
        &self,
        settings: ParentSettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap round trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
