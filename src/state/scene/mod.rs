//! Per-scene controllers. Each scene runs as a single task owning its state
//! machine, timers and effect queue; callers talk to it through a
//! [`SceneHandle`].

mod controller;
mod gate;
mod script;

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use utoipa::ToSchema;

pub use gate::{GateQuestion, ParentGate};
pub use script::{SceneScript, script_for};

use crate::state::{
    effects::{EffectQueue, EffectQueueError, EffectSubscription},
    idle_timer::DEFAULT_IDLE_THRESHOLD,
    progress::SceneId,
    rapid_input::DEFAULT_RAPID_INPUT_WINDOW,
    state_machine::ScenePhase,
    store::ProgressStore,
};

use controller::SceneController;

/// Delay between the end of the badge animation and leaving the scene.
pub const DEFAULT_BADGE_EXIT_DELAY: Duration = Duration::from_millis(500);

/// Every screen driven by a controller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    /// Fire station lesson.
    FireStation,
    /// School evacuation lesson.
    School,
    /// Forest rescue lesson.
    Forest,
    /// Scene picker.
    Map,
    /// Parent area behind the arithmetic gate.
    Parent,
}

impl SceneKind {
    /// All scenes, in display order.
    pub const ALL: [SceneKind; 5] = [
        SceneKind::FireStation,
        SceneKind::School,
        SceneKind::Forest,
        SceneKind::Map,
        SceneKind::Parent,
    ];

    /// Identifier used in routes and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            SceneKind::FireStation => "fire_station",
            SceneKind::School => "school",
            SceneKind::Forest => "forest",
            SceneKind::Map => "map",
            SceneKind::Parent => "parent",
        }
    }

    /// Progress entry tracked for this scene, if it awards a badge.
    pub fn progress_scene(self) -> Option<SceneId> {
        match self {
            SceneKind::FireStation => Some(SceneId::FireStation),
            SceneKind::School => Some(SceneId::School),
            SceneKind::Forest => Some(SceneId::Forest),
            SceneKind::Map | SceneKind::Parent => None,
        }
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name that does not match any scene.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scene `{0}`")]
pub struct UnknownScene(pub String);

impl FromStr for SceneKind {
    type Err = UnknownScene;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        SceneKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| UnknownScene(raw.to_owned()))
    }
}

impl From<SceneId> for SceneKind {
    fn from(scene: SceneId) -> Self {
        match scene {
            SceneId::FireStation => SceneKind::FireStation,
            SceneId::School => SceneKind::School,
            SceneId::Forest => SceneKind::Forest,
        }
    }
}

/// Grown-up action guarded by the arithmetic gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateAction {
    /// Open the parent area from the map.
    EnterParentMode,
    /// Wipe all progress.
    ResetProgress,
    /// Change the play-session limit.
    UpdateSettings {
        /// Session length in minutes.
        session_minutes: u32,
        /// Reminder lead in minutes.
        reminder_minutes: u32,
    },
}

/// Input coming from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    /// The screen became visible.
    ScreenEntered,
    /// The main interactive element was tapped.
    PrimaryActionClicked,
    /// The scene clip finished playing.
    MediaPlaybackCompleted,
    /// The badge reveal animation finished.
    BadgeAnimationCompleted,
    /// The user asked to leave.
    BackRequested,
    /// The idle hint was tapped away.
    IdleHintDismissed,
    /// A scene was picked on the map.
    SceneSelected(SceneId),
    /// The badge collection was opened from the map.
    CollectionRequested,
    /// A guarded action was requested.
    ParentGateRequested(GateAction),
    /// An answer to the open gate question.
    ParentAnswerSubmitted(u32),
    /// The gate was closed without answering.
    ParentGateCancelled,
}

/// Everything a controller reacts to, including its own timers.
#[derive(Debug)]
enum SceneInput {
    Event(SceneEvent),
    IdleElapsed { generation: u64 },
    BadgeDelayElapsed { visit: u64 },
}

#[derive(Debug)]
struct SceneCommand {
    input: SceneInput,
    reply: Option<oneshot::Sender<SceneSnapshot>>,
}

impl SceneCommand {
    fn internal(input: SceneInput) -> Self {
        Self { input, reply: None }
    }
}

/// Observable state of one scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SceneSnapshot {
    /// Scene described.
    pub scene: SceneKind,
    /// Current phase.
    pub phase: ScenePhase,
    /// Whether the scene clip is on screen.
    pub media_playing: bool,
    /// Clip currently playing.
    pub current_media: Option<String>,
    /// Whether the badge reveal is on screen.
    pub badge_overlay_visible: bool,
    /// Whether the idle hint is on screen.
    pub idle_hint_visible: bool,
    /// Whether the scene is completed in the progress record.
    pub scene_completed: bool,
    /// Open arithmetic challenge, if any.
    pub parent_gate: Option<GateQuestion>,
    /// Visit counter, bumped on every entry and exit.
    pub visit: u64,
    /// Milliseconds until the idle hint while the countdown runs.
    pub idle_in_ms: Option<u64>,
}

/// Timings a controller runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneTimings {
    /// Inactivity before the idle hint.
    pub idle_threshold: Duration,
    /// Minimum spacing between accepted taps.
    pub rapid_input_window: Duration,
    /// Pause after the badge animation before leaving.
    pub badge_exit_delay: Duration,
}

impl Default for SceneTimings {
    fn default() -> Self {
        Self {
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            rapid_input_window: DEFAULT_RAPID_INPUT_WINDOW,
            badge_exit_delay: DEFAULT_BADGE_EXIT_DELAY,
        }
    }
}

/// Errors surfaced by [`SceneHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SceneError {
    /// The controller task is gone.
    #[error("scene controller `{0}` has stopped")]
    Stopped(SceneKind),
}

/// Cheaply clonable entry point to a running scene controller.
///
/// The controller task ends once every handle is dropped.
#[derive(Clone)]
pub struct SceneHandle {
    kind: SceneKind,
    inbox: mpsc::UnboundedSender<SceneCommand>,
    effects: Arc<EffectQueue>,
    snapshot: watch::Receiver<SceneSnapshot>,
}

impl SceneHandle {
    /// Spawn the controller for `kind` on the current runtime.
    pub fn spawn(kind: SceneKind, store: ProgressStore, timings: SceneTimings) -> Self {
        let (inbox, rx) = mpsc::unbounded_channel();
        let effects = Arc::new(EffectQueue::new());
        let controller = SceneController::new(
            kind,
            store,
            timings,
            effects.clone(),
            inbox.downgrade(),
        );
        let snapshot = controller.watch();
        tokio::spawn(controller.run(rx));

        Self {
            kind,
            inbox,
            effects,
            snapshot,
        }
    }

    /// Deliver `event` and wait until the controller has handled it.
    pub async fn dispatch(&self, event: SceneEvent) -> Result<SceneSnapshot, SceneError> {
        let (reply, done) = oneshot::channel();
        self.inbox
            .send(SceneCommand {
                input: SceneInput::Event(event),
                reply: Some(reply),
            })
            .map_err(|_| SceneError::Stopped(self.kind))?;
        done.await.map_err(|_| SceneError::Stopped(self.kind))
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SceneSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Attach the single effect consumer.
    pub fn subscribe_effects(&self) -> Result<EffectSubscription, EffectQueueError> {
        self.effects.attach()
    }

    /// Whether an effect consumer is attached.
    pub fn has_effect_subscriber(&self) -> bool {
        self.effects.has_subscriber()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in SceneKind::ALL {
            assert_eq!(kind.as_str().parse::<SceneKind>(), Ok(kind));
        }
        assert_eq!(
            "volcano".parse::<SceneKind>(),
            Err(UnknownScene("volcano".into()))
        );
    }

    #[test]
    fn only_lessons_track_progress() {
        assert_eq!(SceneKind::School.progress_scene(), Some(SceneId::School));
        assert_eq!(SceneKind::Map.progress_scene(), None);
        assert_eq!(SceneKind::from(SceneId::Forest), SceneKind::Forest);
    }
}
