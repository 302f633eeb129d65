use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::validation::{validate_reminder_minutes, validate_session_minutes},
    state::{
        progress::SceneId,
        scene::{GateAction, SceneEvent},
    },
};

/// Grown-up action to guard behind the arithmetic question.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateActionRequest {
    /// Open the parent area from the map.
    EnterParentMode,
    /// Wipe progress back to a fresh install.
    ResetProgress,
    /// Change the play-session limit.
    UpdateSettings {
        /// Session length, one of the offered values.
        session_minutes: u32,
        /// Minutes before the limit at which the reminder fires.
        reminder_minutes: u32,
    },
}

impl From<GateActionRequest> for GateAction {
    fn from(request: GateActionRequest) -> Self {
        match request {
            GateActionRequest::EnterParentMode => GateAction::EnterParentMode,
            GateActionRequest::ResetProgress => GateAction::ResetProgress,
            GateActionRequest::UpdateSettings {
                session_minutes,
                reminder_minutes,
            } => GateAction::UpdateSettings {
                session_minutes,
                reminder_minutes,
            },
        }
    }
}

/// Input sent by the presentation layer to a scene.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneEventRequest {
    /// The scene became visible.
    ScreenEntered,
    /// Play button or device tap.
    PrimaryActionClicked,
    /// The clip started by the scene reached its end.
    MediaPlaybackCompleted,
    /// The badge overlay finished animating.
    BadgeAnimationCompleted,
    /// Back button.
    BackRequested,
    /// The child closed the idle hint.
    IdleHintDismissed,
    /// A scene was picked on the map.
    SceneSelected {
        /// Scene to open.
        scene: SceneId,
    },
    /// Badge collection button on the map.
    CollectionRequested,
    /// Ask for the arithmetic gate in front of a grown-up action.
    ParentGateRequested {
        /// Action to perform once answered.
        action: GateActionRequest,
    },
    /// Answer typed into the open gate.
    ParentAnswerSubmitted {
        /// Proposed sum.
        answer: u32,
    },
    /// Gate dismissed without answering.
    ParentGateCancelled,
}

impl Validate for SceneEventRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let SceneEventRequest::ParentGateRequested {
            action:
                GateActionRequest::UpdateSettings {
                    session_minutes,
                    reminder_minutes,
                },
        } = self
        {
            if let Err(e) = validate_session_minutes(*session_minutes) {
                errors.add("session_minutes", e);
            }
            if let Err(e) = validate_reminder_minutes(*reminder_minutes, *session_minutes) {
                errors.add("reminder_minutes", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<SceneEventRequest> for SceneEvent {
    fn from(request: SceneEventRequest) -> Self {
        match request {
            SceneEventRequest::ScreenEntered => SceneEvent::ScreenEntered,
            SceneEventRequest::PrimaryActionClicked => SceneEvent::PrimaryActionClicked,
            SceneEventRequest::MediaPlaybackCompleted => SceneEvent::MediaPlaybackCompleted,
            SceneEventRequest::BadgeAnimationCompleted => SceneEvent::BadgeAnimationCompleted,
            SceneEventRequest::BackRequested => SceneEvent::BackRequested,
            SceneEventRequest::IdleHintDismissed => SceneEvent::IdleHintDismissed,
            SceneEventRequest::SceneSelected { scene } => SceneEvent::SceneSelected(scene),
            SceneEventRequest::CollectionRequested => SceneEvent::CollectionRequested,
            SceneEventRequest::ParentGateRequested { action } => {
                SceneEvent::ParentGateRequested(action.into())
            }
            SceneEventRequest::ParentAnswerSubmitted { answer } => {
                SceneEvent::ParentAnswerSubmitted(answer)
            }
            SceneEventRequest::ParentGateCancelled => SceneEvent::ParentGateCancelled,
        }
    }
}
