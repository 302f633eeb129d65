use tracing::info;

use crate::{
    error::ServiceError,
    state::{
        SharedState,
        effects::EffectSubscription,
        scene::{SceneEvent, SceneKind, SceneSnapshot},
    },
};

/// Latest snapshot of `kind`.
pub fn snapshot(state: &SharedState, kind: SceneKind) -> SceneSnapshot {
    state.scene(kind).snapshot()
}

/// Deliver `event` to the controller of `kind` and return the resulting snapshot.
pub async fn dispatch(
    state: &SharedState,
    kind: SceneKind,
    event: SceneEvent,
) -> Result<SceneSnapshot, ServiceError> {
    Ok(state.scene(kind).dispatch(event).await?)
}

/// Attach the single effect consumer of `kind`.
pub fn subscribe_effects(
    state: &SharedState,
    kind: SceneKind,
) -> Result<EffectSubscription, ServiceError> {
    let subscription = state.scene(kind).subscribe_effects()?;
    info!(scene = %kind, "effect stream attached");
    Ok(subscription)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::progress_store::memory::MemoryProgressBackend,
        state::{AppState, effects::Effect, progress::SceneId, state_machine::ScenePhase},
    };

    #[tokio::test(start_paused = true)]
    async fn dispatch_reaches_the_scene_controller() {
        let state = AppState::new(AppConfig::default());
        state
            .install_backend(Arc::new(MemoryProgressBackend::new()))
            .await
            .unwrap();
        let mut effects = subscribe_effects(&state, SceneKind::FireStation).unwrap();

        for event in [
            SceneEvent::ScreenEntered,
            SceneEvent::PrimaryActionClicked,
            SceneEvent::MediaPlaybackCompleted,
        ] {
            dispatch(&state, SceneKind::FireStation, event).await.unwrap();
        }

        assert_eq!(
            snapshot(&state, SceneKind::FireStation).phase,
            ScenePhase::Completed
        );
        assert!(effects.drain().contains(&Effect::UnlockNotification {
            scene: SceneId::School
        }));
    }

    #[tokio::test]
    async fn second_effect_consumer_is_refused() {
        let state = AppState::new(AppConfig::default());
        let _first = subscribe_effects(&state, SceneKind::Map).unwrap();

        let second = subscribe_effects(&state, SceneKind::Map);
        assert!(matches!(second, Err(ServiceError::InvalidState(_))));
    }
}
