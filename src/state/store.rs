//! Canonical progress record with observable reads and serialized writes.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use time::Date;
use tokio::{
    sync::{Mutex, RwLock, watch},
    time::timeout,
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{ParentSettingsEntity, ProgressEntity},
        progress_store::ProgressBackend,
        storage::StorageError,
    },
    state::{
        progress::{GameProgress, Regression},
        settings::{ParentSettings, SettingsError},
    },
};

/// Upper bound for a single backend write.
pub const DEFAULT_PERSISTENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure of a store operation. A successful no-op is never reported as an error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No backend is installed or the installed one is unhealthy.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The backend rejected the operation.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The backend did not confirm in time; the write may or may not have landed.
    #[error("storage did not confirm the write within {0:?}")]
    Timeout(Duration),
    /// The proposed record would move the lattice backwards.
    #[error("update rejected: {0}")]
    Regression(Regression),
    /// The proposed settings are out of range.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The writer task died before reporting back.
    #[error("writer task ended before confirming the write")]
    WriterLost,
}

/// Cheaply clonable handle to the shared progress record.
#[derive(Clone)]
pub struct ProgressStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    progress: watch::Sender<GameProgress>,
    settings: watch::Sender<ParentSettings>,
    backend: RwLock<Option<Arc<dyn ProgressBackend>>>,
    degraded: watch::Sender<bool>,
    write_gate: Mutex<()>,
    write_timeout: Duration,
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new(DEFAULT_PERSISTENCE_TIMEOUT)
    }
}

impl ProgressStore {
    /// Create a store holding the initial record. It stays degraded until a
    /// backend is installed.
    pub fn new(write_timeout: Duration) -> Self {
        let (progress, _) = watch::channel(GameProgress::initial());
        let (settings, _) = watch::channel(ParentSettings::default());
        let (degraded, _) = watch::channel(true);
        Self {
            inner: Arc::new(StoreInner {
                progress,
                settings,
                backend: RwLock::new(None),
                degraded,
                write_gate: Mutex::new(()),
                write_timeout,
            }),
        }
    }

    /// Latest committed record.
    pub fn current(&self) -> GameProgress {
        self.inner.progress.borrow().clone()
    }

    /// Stream that yields the latest record immediately, then every committed change.
    pub fn observe(&self) -> WatchStream<GameProgress> {
        WatchStream::new(self.inner.progress.subscribe())
    }

    /// Raw receiver for callers that want to `changed().await` themselves.
    pub fn subscribe(&self) -> watch::Receiver<GameProgress> {
        self.inner.progress.subscribe()
    }

    /// Latest committed parent settings.
    pub fn settings(&self) -> ParentSettings {
        self.inner.settings.borrow().clone()
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.inner.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.inner.degraded.subscribe()
    }

    /// Obtain a handle to the current backend, if one is installed.
    pub async fn backend(&self) -> Option<Arc<dyn ProgressBackend>> {
        self.inner.backend.read().await.as_ref().cloned()
    }

    /// Load the persisted documents from `backend`, repair them and make the
    /// backend the write target. Leaves degraded mode on success.
    pub async fn install_backend(&self, backend: Arc<dyn ProgressBackend>) -> Result<(), StoreError> {
        let _gate = self.inner.write_gate.lock().await;
        let limit = self.inner.write_timeout;

        let progress = timeout(limit, backend.load_progress())
            .await
            .map_err(|_| StoreError::Timeout(limit))??;
        let settings = timeout(limit, backend.load_settings())
            .await
            .map_err(|_| StoreError::Timeout(limit))??;

        if let Some(entity) = progress {
            let loaded = entity.into_domain()?.normalized();
            info!(
                badges = loaded.total_badges(),
                recommended = %loaded.recommended_scene(),
                "loaded persisted progress"
            );
            self.inner.progress.send_replace(loaded);
        }
        if let Some(entity) = settings {
            self.inner.settings.send_replace(entity.into());
        }

        *self.inner.backend.write().await = Some(backend);
        self.set_degraded(false);
        Ok(())
    }

    /// Drop the current backend and enter degraded mode.
    pub async fn clear_backend(&self) {
        self.inner.backend.write().await.take();
        self.set_degraded(true);
    }

    /// Flip the degraded flag, notifying watchers only on change.
    pub fn set_degraded(&self, value: bool) {
        self.inner.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Atomic read-modify-write of the record.
    ///
    /// `f` sees the latest committed record and returns the proposed record
    /// plus a value handed back to the caller. An unchanged record skips the
    /// write entirely. The write runs on its own task, so dropping the
    /// returned future does not cancel a write that already started.
    pub async fn update_with<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&GameProgress) -> (GameProgress, R) + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.apply_progress(f).await })
            .await
            .map_err(|_| StoreError::WriterLost)?
    }

    /// [`ProgressStore::update_with`] returning the committed record.
    pub async fn update<F>(&self, f: F) -> Result<GameProgress, StoreError>
    where
        F: FnOnce(&GameProgress) -> GameProgress + Send + 'static,
    {
        self.update_with(move |current| {
            let next = f(current);
            (next.clone(), next)
        })
        .await
    }

    /// Replace the record with a fresh one. The only operation allowed to
    /// move statuses backwards.
    pub async fn reset(&self) -> Result<GameProgress, StoreError> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _gate = inner.write_gate.lock().await;
            let fresh = GameProgress::initial();
            inner.persist_progress(&fresh).await?;
            inner.progress.send_replace(fresh.clone());
            info!("progress reset to initial state");
            Ok(fresh)
        })
        .await
        .map_err(|_| StoreError::WriterLost)?
    }

    /// Atomic read-modify-write of the parent settings.
    pub async fn update_settings<F>(&self, f: F) -> Result<ParentSettings, StoreError>
    where
        F: FnOnce(&ParentSettings) -> Result<ParentSettings, SettingsError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.apply_settings(f).await })
            .await
            .map_err(|_| StoreError::WriterLost)?
    }

    /// Add `elapsed_ms` of play time to `day`.
    pub async fn record_usage(&self, day: Date, elapsed_ms: u64) -> Result<ParentSettings, StoreError> {
        self.update_settings(move |settings| Ok(settings.with_usage(day, elapsed_ms)))
            .await
    }
}

impl StoreInner {
    async fn apply_progress<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&GameProgress) -> (GameProgress, R),
    {
        let _gate = self.write_gate.lock().await;
        let current = self.progress.borrow().clone();
        let (next, outcome) = f(&current);

        if next == current {
            debug!("progress unchanged; skipping write");
            return Ok(outcome);
        }

        if let Some(regression) = next.regression_from(&current) {
            warn!(%regression, "rejecting regressive progress update");
            return Err(StoreError::Regression(regression));
        }

        self.persist_progress(&next).await?;
        self.progress.send_replace(next);
        Ok(outcome)
    }

    async fn apply_settings<F>(&self, f: F) -> Result<ParentSettings, StoreError>
    where
        F: FnOnce(&ParentSettings) -> Result<ParentSettings, SettingsError>,
    {
        let _gate = self.write_gate.lock().await;
        let current = self.settings.borrow().clone();
        let next = f(&current)?;

        if next == current {
            return Ok(next);
        }

        let backend = self.writable_backend().await?;
        let entity = ParentSettingsEntity::from(&next);
        self.bounded(backend.save_settings(entity)).await?;
        self.settings.send_replace(next.clone());
        Ok(next)
    }

    async fn persist_progress(&self, progress: &GameProgress) -> Result<(), StoreError> {
        let backend = self.writable_backend().await?;
        let entity = ProgressEntity::from(progress);
        self.bounded(backend.save_progress(entity)).await
    }

    async fn writable_backend(&self) -> Result<Arc<dyn ProgressBackend>, StoreError> {
        if *self.degraded.borrow() {
            return Err(StoreError::Degraded);
        }
        self.backend
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(StoreError::Degraded)
    }

    async fn bounded<Fut>(&self, write: Fut) -> Result<(), StoreError>
    where
        Fut: Future<Output = Result<(), StorageError>>,
    {
        match timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                warn!(error = %err, "storage write failed");
                Err(StoreError::Storage(err))
            }
            Err(_) => {
                warn!(timeout = ?self.write_timeout, "storage write timed out");
                Err(StoreError::Timeout(self.write_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, future::BoxFuture};
    use time::Month;
    use tokio::time::sleep;

    use super::*;
    use crate::{
        dao::{
            progress_store::memory::MemoryProgressBackend,
            storage::StorageResult,
        },
        state::progress::{Completion, SceneId, SceneStatus},
    };

    /// Memory backend whose progress writes take `delay` to confirm.
    struct SlowBackend {
        inner: MemoryProgressBackend,
        delay: Duration,
    }

    impl ProgressBackend for SlowBackend {
        fn load_progress(&self) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
            self.inner.load_progress()
        }

        fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
            let save = self.inner.save_progress(progress);
            let delay = self.delay;
            Box::pin(async move {
                sleep(delay).await;
                save.await
            })
        }

        fn load_settings(&self) -> BoxFuture<'static, StorageResult<Option<ParentSettingsEntity>>> {
            self.inner.load_settings()
        }

        fn save_settings(&self, settings: ParentSettingsEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.save_settings(settings)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    async fn store_with(backend: MemoryProgressBackend) -> ProgressStore {
        let store = ProgressStore::default();
        store.install_backend(Arc::new(backend)).await.unwrap();
        store
    }

    fn complete(scene: SceneId) -> impl FnOnce(&GameProgress) -> (GameProgress, Completion) + Send + 'static {
        move |progress| progress.complete_scene(scene, 1_000)
    }

    #[tokio::test]
    async fn observe_replays_latest_then_pushes_updates() {
        let store = store_with(MemoryProgressBackend::new()).await;
        let mut stream = store.observe();

        let first = stream.next().await.unwrap();
        assert_eq!(first, GameProgress::initial());

        store.update_with(complete(SceneId::FireStation)).await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(second.status(SceneId::FireStation), SceneStatus::Completed);

        let late = store.observe().next().await.unwrap();
        assert_eq!(late, second);
    }

    #[tokio::test]
    async fn unchanged_record_skips_the_write() {
        let backend = MemoryProgressBackend::new();
        let store = store_with(backend.clone()).await;

        store.update_with(complete(SceneId::FireStation)).await.unwrap();
        let again = store.update_with(complete(SceneId::FireStation)).await.unwrap();

        assert_eq!(again, Completion::AlreadyCompleted);
        assert_eq!(backend.progress_writes(), 1);
        assert_eq!(store.current().total_badges(), 1);
    }

    #[tokio::test]
    async fn regressive_update_is_rejected() {
        let store = store_with(MemoryProgressBackend::new()).await;
        store.update_with(complete(SceneId::FireStation)).await.unwrap();

        let err = store.update(|_| GameProgress::initial()).await.unwrap_err();
        assert!(matches!(err, StoreError::Regression(_)));
        assert_eq!(
            store.current().status(SceneId::FireStation),
            SceneStatus::Completed
        );
    }

    #[tokio::test]
    async fn degraded_store_refuses_writes() {
        let store = ProgressStore::default();
        let err = store
            .update_with(complete(SceneId::FireStation))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Degraded));
        assert_eq!(store.current(), GameProgress::initial());
    }

    #[tokio::test]
    async fn backend_failure_leaves_record_untouched() {
        let backend = MemoryProgressBackend::new();
        let store = store_with(backend.clone()).await;
        backend.set_offline(true);

        let err = store
            .update_with(complete(SceneId::FireStation))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(store.current(), GameProgress::initial());

        backend.set_offline(false);
        store.update_with(complete(SceneId::FireStation)).await.unwrap();
        assert_eq!(store.current().total_badges(), 1);
    }

    #[tokio::test]
    async fn installing_a_backend_repairs_the_loaded_record() {
        let mut entity = ProgressEntity::from(&GameProgress::initial());
        entity
            .scene_status
            .insert("fire_station".into(), "completed".into());
        let store = store_with(MemoryProgressBackend::with_progress(entity)).await;

        assert!(!store.is_degraded());
        assert_eq!(store.current().status(SceneId::School), SceneStatus::Unlocked);
    }

    #[tokio::test]
    async fn concurrent_completions_award_one_badge() {
        let store = store_with(MemoryProgressBackend::new()).await;

        let first = tokio::spawn({
            let store = store.clone();
            async move { store.update_with(complete(SceneId::FireStation)).await }
        });
        let second = tokio::spawn({
            let store = store.clone();
            async move { store.update_with(complete(SceneId::FireStation)).await }
        });

        let outcomes = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
        let awarded = outcomes
            .iter()
            .filter(|c| matches!(c, Completion::Awarded { .. }))
            .count();

        assert_eq!(awarded, 1);
        assert_eq!(store.current().total_badges(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_caller_does_not_cancel_the_write() {
        let memory = MemoryProgressBackend::new();
        let store = ProgressStore::default();
        store
            .install_backend(Arc::new(SlowBackend {
                inner: memory.clone(),
                delay: Duration::from_millis(200),
            }))
            .await
            .unwrap();

        let caller = tokio::spawn({
            let store = store.clone();
            async move { store.update_with(complete(SceneId::FireStation)).await }
        });
        sleep(Duration::from_millis(50)).await;
        caller.abort();

        sleep(Duration::from_millis(500)).await;
        assert_eq!(memory.progress_writes(), 1);
        assert_eq!(
            store.current().status(SceneId::FireStation),
            SceneStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let store = ProgressStore::new(Duration::from_millis(100));
        store
            .install_backend(Arc::new(SlowBackend {
                inner: MemoryProgressBackend::new(),
                delay: Duration::from_secs(1),
            }))
            .await
            .unwrap();

        let err = store
            .update_with(complete(SceneId::FireStation))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert_eq!(store.current(), GameProgress::initial());
    }

    #[tokio::test]
    async fn reset_restores_the_initial_record() {
        let store = store_with(MemoryProgressBackend::new()).await;
        store.update_with(complete(SceneId::FireStation)).await.unwrap();

        let fresh = store.reset().await.unwrap();
        assert_eq!(fresh, GameProgress::initial());
        assert_eq!(store.current(), GameProgress::initial());
    }

    #[tokio::test]
    async fn settings_updates_validate_and_accumulate_usage() {
        let store = store_with(MemoryProgressBackend::new()).await;
        let day = Date::from_calendar_date(2026, Month::May, 1).unwrap();

        let err = store
            .update_settings(|s| s.with_session_limit(7, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Settings(_)));

        store
            .update_settings(|s| s.with_session_limit(10, 2))
            .await
            .unwrap();
        store.record_usage(day, 1_500).await.unwrap();
        store.record_usage(day, 500).await.unwrap();

        let settings = store.settings();
        assert_eq!(settings.session_minutes(), 10);
        assert_eq!(settings.usage_for(day), 2_000);
    }
}
