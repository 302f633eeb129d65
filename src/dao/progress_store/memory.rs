//! Volatile backend used for demos and tests.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::dao::{
    models::{ParentSettingsEntity, ProgressEntity},
    progress_store::ProgressBackend,
    storage::{StorageError, StorageResult},
};

/// Failure reported while the backend simulates an outage.
#[derive(Debug, Error)]
#[error("in-memory backend is offline")]
pub struct Offline;

#[derive(Default)]
struct Documents {
    progress: Option<ProgressEntity>,
    settings: Option<ParentSettingsEntity>,
}

/// Keeps documents in process memory. Everything is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryProgressBackend {
    documents: Arc<Mutex<Documents>>,
    offline: Arc<AtomicBool>,
    progress_writes: Arc<AtomicUsize>,
}

impl MemoryProgressBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-seeded with a progress document.
    pub fn with_progress(progress: ProgressEntity) -> Self {
        Self {
            documents: Arc::new(Mutex::new(Documents {
                progress: Some(progress),
                settings: None,
            })),
            ..Self::default()
        }
    }

    /// Simulate an outage: every call fails until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of progress documents written so far.
    pub fn progress_writes(&self) -> usize {
        self.progress_writes.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable("memory backend offline".into(), Offline))
        } else {
            Ok(())
        }
    }
}

impl ProgressBackend for MemoryProgressBackend {
    fn load_progress(&self) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let backend = self.clone();
        Box::pin(async move {
            backend.ensure_online()?;
            Ok(backend.documents.lock().await.progress.clone())
        })
    }

    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let backend = self.clone();
        Box::pin(async move {
            backend.ensure_online()?;
            backend.documents.lock().await.progress = Some(progress);
            backend.progress_writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn load_settings(&self) -> BoxFuture<'static, StorageResult<Option<ParentSettingsEntity>>> {
        let backend = self.clone();
        Box::pin(async move {
            backend.ensure_online()?;
            Ok(backend.documents.lock().await.settings.clone())
        })
    }

    fn save_settings(
        &self,
        settings: ParentSettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let backend = self.clone();
        Box::pin(async move {
            backend.ensure_online()?;
            backend.documents.lock().await.settings = Some(settings);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let backend = self.clone();
        Box::pin(async move { backend.ensure_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}
