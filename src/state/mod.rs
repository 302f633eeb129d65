/// One-shot effects delivered to the presentation layer.
pub mod effects;
/// Restartable inactivity countdown.
pub mod idle_timer;
/// Unlock lattice and badges.
pub mod progress;
/// Double-tap debouncer.
pub mod rapid_input;
/// Per-scene controllers.
pub mod scene;
/// Parental play-session timer.
pub mod session;
/// Parent settings and daily usage.
pub mod settings;
mod sse;
/// Scene phase machine.
pub mod state_machine;
/// Shared progress record and its persistence.
pub mod store;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::{
    config::AppConfig,
    dao::progress_store::ProgressBackend,
    state::{
        scene::{SceneHandle, SceneKind},
        session::SessionTimer,
        store::{ProgressStore, StoreError},
    },
};

pub use self::sse::SseHub;

/// Cheaply cloneable handle to [`AppState`].
pub type SharedState = Arc<AppState>;

const PUBLIC_SSE_CAPACITY: usize = 32;

/// Central application state: the progress record, the scene controllers and
/// the play-session timer.
pub struct AppState {
    config: AppConfig,
    store: ProgressStore,
    scenes: DashMap<SceneKind, SceneHandle>,
    session: SessionTimer,
    public_sse: SseHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let store = ProgressStore::new(config.persistence_timeout());
        Arc::new(Self {
            session: SessionTimer::new(store.clone()),
            store,
            scenes: DashMap::new(),
            public_sse: SseHub::new(PUBLIC_SSE_CAPACITY),
            config,
        })
    }

    /// Configuration the server was started with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Shared progress record.
    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Controller for `kind`, spawned on first use.
    pub fn scene(&self, kind: SceneKind) -> SceneHandle {
        self.scenes
            .entry(kind)
            .or_insert_with(|| {
                SceneHandle::spawn(kind, self.store.clone(), self.config.scene_timings())
            })
            .clone()
    }

    /// Parental-control session timer.
    pub fn session(&self) -> &SessionTimer {
        &self.session
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.public_sse
    }

    /// Install a storage backend, loading its documents, and leave degraded mode.
    pub async fn install_backend(&self, backend: Arc<dyn ProgressBackend>) -> Result<(), StoreError> {
        self.store.install_backend(backend).await
    }

    /// Remove the current backend and enter degraded mode.
    pub async fn clear_backend(&self) {
        self.store.clear_backend().await;
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        self.store.is_degraded()
    }

    /// Flip the degraded flag, notifying watchers only on change.
    pub fn update_degraded(&self, value: bool) {
        self.store.set_degraded(value);
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.store.degraded_watcher()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::progress_store::memory::MemoryProgressBackend;

    #[tokio::test]
    async fn starts_degraded_until_a_backend_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());

        state
            .install_backend(Arc::new(MemoryProgressBackend::new()))
            .await
            .unwrap();
        assert!(!state.is_degraded());

        state.clear_backend().await;
        assert!(state.is_degraded());
    }

    #[tokio::test]
    async fn scene_controllers_are_shared() {
        let state = AppState::new(AppConfig::default());
        let first = state.scene(SceneKind::Map);
        let _effects = first.subscribe_effects().unwrap();

        let second = state.scene(SceneKind::Map);
        assert!(second.has_effect_subscriber());
        assert!(!state.scene(SceneKind::School).has_effect_subscriber());
    }
}
