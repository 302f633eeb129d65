//! One-shot side effects handed from a scene controller to its presentation layer.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::state::progress::SceneId;

/// Instruction for the presentation layer. Each effect is delivered at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Start playing the scene clip.
    StartMedia {
        /// Clip to play.
        resource: String,
    },
    /// Play the voice line introducing the scene.
    PlayIntroHint {
        /// Voice clip to play.
        voice: String,
    },
    /// Nudge an inactive child.
    ShowIdleHint,
    /// Input arrived too quickly and was ignored.
    ShowSlowDownHint,
    /// Celebrate a new badge with a sound.
    PlayBadgeSound,
    /// Show the badge reveal animation.
    ShowBadgeOverlay {
        /// Badge kind being revealed.
        kind: String,
        /// Visual variant of the badge.
        variant: u32,
    },
    /// The scene had already been finished; replay the short jingle only.
    PlayCompletedSound,
    /// A scene became available.
    UnlockNotification {
        /// Scene that was unlocked.
        scene: SceneId,
    },
    /// Leave the current screen.
    NavigateBack,
    /// Completion could not be saved; the UI may offer a retry.
    ProgressSaveFailed,
    /// The selected scene is still locked.
    PlayLockedHint,
    /// Announce a scene before opening it.
    PlaySceneSound {
        /// Scene being opened.
        scene: SceneId,
    },
    /// Open a scene.
    NavigateToScene {
        /// Scene to open.
        scene: SceneId,
    },
    /// Open the badge collection.
    NavigateToCollection,
    /// Open the parent area.
    NavigateToParent,
    /// The parent gate answer was wrong.
    ShowVerificationFailedHint,
    /// Progress was reset.
    ShowResetSuccessHint,
    /// Parent settings were saved.
    ShowSettingsSavedHint,
}

/// Failure to attach a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EffectQueueError {
    /// Another consumer is still draining this queue.
    #[error("effect queue already has a subscriber")]
    AlreadyAttached,
}

/// Ordered, single-consumer effect channel.
///
/// Emitting never blocks. Effects emitted while no consumer is attached are
/// dropped, and so are effects still buffered when a consumer detaches.
#[derive(Debug, Default)]
pub struct EffectQueue {
    subscriber: Mutex<Option<mpsc::UnboundedSender<Effect>>>,
}

impl EffectQueue {
    /// Create a queue with no consumer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the single consumer. Fails while a previous consumer is alive.
    pub fn attach(&self) -> Result<EffectSubscription, EffectQueueError> {
        let mut slot = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(EffectQueueError::AlreadyAttached);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(tx);
        Ok(EffectSubscription { rx })
    }

    /// Whether a live consumer is attached.
    pub fn has_subscriber(&self) -> bool {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Queue `effect` for the consumer. Returns false when it was dropped.
    pub fn emit(&self, effect: Effect) -> bool {
        let mut slot = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = slot.as_ref() else {
            return false;
        };
        if tx.send(effect).is_err() {
            slot.take();
            return false;
        }
        true
    }
}

/// Consumer side of an [`EffectQueue`]. Dropping it detaches.
#[derive(Debug)]
pub struct EffectSubscription {
    rx: mpsc::UnboundedReceiver<Effect>,
}

impl EffectSubscription {
    /// Wait for the next effect. `None` once the producing controller is gone.
    pub async fn recv(&mut self) -> Option<Effect> {
        self.rx.recv().await
    }

    /// Next effect if one is already queued.
    pub fn try_recv(&mut self) -> Option<Effect> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now, in order.
    pub fn drain(&mut self) -> Vec<Effect> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effects_arrive_in_emission_order() {
        let queue = EffectQueue::new();
        let mut sub = queue.attach().unwrap();

        assert!(queue.emit(Effect::PlayBadgeSound));
        assert!(queue.emit(Effect::UnlockNotification {
            scene: SceneId::School
        }));
        assert!(queue.emit(Effect::NavigateBack));

        assert_eq!(
            sub.drain(),
            vec![
                Effect::PlayBadgeSound,
                Effect::UnlockNotification {
                    scene: SceneId::School
                },
                Effect::NavigateBack,
            ]
        );
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn second_subscriber_is_refused_while_first_is_alive() {
        let queue = EffectQueue::new();
        let first = queue.attach().unwrap();
        assert_eq!(queue.attach().unwrap_err(), EffectQueueError::AlreadyAttached);

        drop(first);
        assert!(queue.attach().is_ok());
    }

    #[test]
    fn effects_without_subscriber_are_dropped() {
        let queue = EffectQueue::new();
        assert!(!queue.emit(Effect::ShowIdleHint));

        let mut sub = queue.attach().unwrap();
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn detaching_loses_undelivered_effects() {
        let queue = EffectQueue::new();
        let sub = queue.attach().unwrap();
        queue.emit(Effect::ShowIdleHint);
        drop(sub);

        assert!(!queue.emit(Effect::NavigateBack));
        assert!(!queue.has_subscriber());

        let mut replacement = queue.attach().unwrap();
        queue.emit(Effect::PlayBadgeSound);
        assert_eq!(replacement.drain(), vec![Effect::PlayBadgeSound]);
    }

    #[test]
    fn effects_serialize_with_a_type_tag() {
        let value = serde_json::to_value(Effect::StartMedia {
            resource: "videos/fire_station.mp4".into(),
        })
        .unwrap();
        assert_eq!(value["type"], "start_media");
        assert_eq!(value["resource"], "videos/fire_station.mp4");

        let value = serde_json::to_value(Effect::NavigateToScene {
            scene: SceneId::Forest,
        })
        .unwrap();
        assert_eq!(value["scene"], "forest");
    }
}
