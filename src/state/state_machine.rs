use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Phases a scene controller moves through during a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScenePhase {
    /// Nothing on screen yet, or the visit is over.
    Idle,
    /// Scene is shown and waits for the primary action.
    AwaitingInput,
    /// The scene's clip is playing; back navigation is refused.
    PlayingMedia,
    /// Completion is being persisted; only visible while a plan is pending.
    AwardingBadge,
    /// The scene finished for this visit.
    Completed,
}

/// Steps that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneStep {
    /// The screen became visible (again).
    Enter,
    /// The primary action started the clip.
    StartMedia,
    /// The clip finished and completion was recorded.
    FinishMedia,
    /// The badge animation was acknowledged.
    Acknowledge,
    /// The user left the scene.
    Exit,
    /// The scene's progress status is locked; the visit ends from any phase.
    Lock,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {step:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid step was received.
    pub from: ScenePhase,
    /// The step that cannot be applied from this phase.
    pub step: SceneStep,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine will transition to.
    pub to: ScenePhase,
    /// Step that triggered this transition.
    pub step: SceneStep,
}

/// Per-scene state machine.
///
/// Transitions that depend on persistence are two-phase: [`SceneStateMachine::plan`]
/// validates the step, the caller performs the write, then either
/// [`SceneStateMachine::apply`] or [`SceneStateMachine::abort`] settles it.
#[derive(Debug, Clone)]
pub struct SceneStateMachine {
    phase: ScenePhase,
    pending: Option<Plan>,
    idle_hint_visible: bool,
}

impl Default for SceneStateMachine {
    fn default() -> Self {
        Self {
            phase: ScenePhase::Idle,
            pending: None,
            idle_hint_visible: false,
        }
    }
}

impl SceneStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observable phase.
    pub fn phase(&self) -> ScenePhase {
        match &self.pending {
            Some(plan) if plan.step == SceneStep::FinishMedia => ScenePhase::AwardingBadge,
            _ => self.phase,
        }
    }

    /// Whether the idle hint is shown.
    pub fn idle_hint_visible(&self) -> bool {
        self.idle_hint_visible
    }

    /// Show the idle hint. Only allowed over `Idle` and `AwaitingInput`;
    /// returns whether the hint became visible.
    pub fn show_idle_hint(&mut self) -> bool {
        if self.pending.is_some()
            || !matches!(self.phase, ScenePhase::Idle | ScenePhase::AwaitingInput)
        {
            return false;
        }
        self.idle_hint_visible = true;
        true
    }

    /// Hide the idle hint.
    pub fn hide_idle_hint(&mut self) {
        self.idle_hint_visible = false;
    }

    /// Plan and immediately apply a step that needs no external confirmation.
    pub fn advance(&mut self, step: SceneStep) -> Result<ScenePhase, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(step)
            .map_err(PlanError::InvalidTransition)?;
        self.settle(next);
        Ok(next)
    }

    /// Plan a transition by validating that the step can be applied from the current phase.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, step: SceneStep) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(step)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            to: next,
            step,
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<ScenePhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        self.settle(plan.to);
        Ok(self.phase)
    }

    /// Abort a planned transition without applying it, returning the state machine to its previous state.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn settle(&mut self, phase: ScenePhase) {
        self.phase = phase;
        if !matches!(phase, ScenePhase::Idle | ScenePhase::AwaitingInput) {
            self.idle_hint_visible = false;
        }
    }

    /// Compute a transition from a step if the transition is valid.
    fn compute_transition(&self, step: SceneStep) -> Result<ScenePhase, InvalidTransition> {
        let next = match (self.phase, step) {
            (_, SceneStep::Enter) => ScenePhase::AwaitingInput,
            (ScenePhase::AwaitingInput, SceneStep::StartMedia) => ScenePhase::PlayingMedia,
            (ScenePhase::PlayingMedia, SceneStep::FinishMedia) => ScenePhase::Completed,
            (ScenePhase::Completed, SceneStep::Acknowledge) => ScenePhase::Idle,
            (
                ScenePhase::Idle | ScenePhase::AwaitingInput | ScenePhase::Completed,
                SceneStep::Exit,
            ) => ScenePhase::Idle,
            (_, SceneStep::Lock) => ScenePhase::Idle,
            (from, step) => return Err(InvalidTransition { from, step }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SceneStateMachine, step: SceneStep) -> ScenePhase {
        let plan = sm.plan(step).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_idle() {
        let sm = SceneStateMachine::new();
        assert_eq!(sm.phase(), ScenePhase::Idle);
        assert!(!sm.idle_hint_visible());
    }

    #[test]
    fn full_happy_path_through_a_visit() {
        let mut sm = SceneStateMachine::new();

        assert_eq!(apply(&mut sm, SceneStep::Enter), ScenePhase::AwaitingInput);
        assert_eq!(apply(&mut sm, SceneStep::StartMedia), ScenePhase::PlayingMedia);
        assert_eq!(apply(&mut sm, SceneStep::FinishMedia), ScenePhase::Completed);
        assert_eq!(apply(&mut sm, SceneStep::Acknowledge), ScenePhase::Idle);
        assert!(sm.pending.is_none());
    }

    #[test]
    fn pending_completion_reads_as_awarding_badge() {
        let mut sm = SceneStateMachine::new();
        apply(&mut sm, SceneStep::Enter);
        apply(&mut sm, SceneStep::StartMedia);

        let plan = sm.plan(SceneStep::FinishMedia).unwrap();
        assert_eq!(sm.phase(), ScenePhase::AwardingBadge);
        assert_eq!(sm.plan(SceneStep::Exit).unwrap_err(), PlanError::AlreadyPending);

        sm.abort(plan.id).unwrap();
        assert_eq!(sm.phase(), ScenePhase::PlayingMedia);
        assert!(sm.pending.is_none());
    }

    #[test]
    fn exit_is_refused_while_media_plays() {
        let mut sm = SceneStateMachine::new();
        apply(&mut sm, SceneStep::Enter);
        apply(&mut sm, SceneStep::StartMedia);

        let err = sm.plan(SceneStep::Exit).unwrap_err();
        match err {
            PlanError::InvalidTransition(InvalidTransition { from, step }) => {
                assert_eq!(from, ScenePhase::PlayingMedia);
                assert_eq!(step, SceneStep::Exit);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn enter_is_accepted_from_any_settled_phase() {
        let mut sm = SceneStateMachine::new();
        apply(&mut sm, SceneStep::Enter);
        apply(&mut sm, SceneStep::StartMedia);
        apply(&mut sm, SceneStep::FinishMedia);
        assert_eq!(apply(&mut sm, SceneStep::Enter), ScenePhase::AwaitingInput);
    }

    #[test]
    fn lock_closes_the_visit_even_during_playback() {
        let mut sm = SceneStateMachine::new();
        apply(&mut sm, SceneStep::Enter);
        apply(&mut sm, SceneStep::StartMedia);

        assert_eq!(sm.advance(SceneStep::Lock).unwrap(), ScenePhase::Idle);
        assert_eq!(
            sm.advance(SceneStep::StartMedia).unwrap_err(),
            PlanError::InvalidTransition(InvalidTransition {
                from: ScenePhase::Idle,
                step: SceneStep::StartMedia,
            })
        );
    }

    #[test]
    fn idle_hint_only_over_waiting_phases() {
        let mut sm = SceneStateMachine::new();
        apply(&mut sm, SceneStep::Enter);
        assert!(sm.show_idle_hint());

        apply(&mut sm, SceneStep::StartMedia);
        assert!(!sm.idle_hint_visible());
        assert!(!sm.show_idle_hint());
    }

    #[test]
    fn mismatched_plan_id_keeps_the_plan() {
        let mut sm = SceneStateMachine::new();
        let plan = sm.plan(SceneStep::Enter).unwrap();

        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert_eq!(sm.apply(plan.id).unwrap(), ScenePhase::AwaitingInput);
    }

    #[test]
    fn abort_clears_pending() {
        let mut sm = SceneStateMachine::new();
        let plan = sm.plan(SceneStep::Enter).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(sm.pending.is_none());
        assert_eq!(sm.phase(), ScenePhase::Idle);
    }
}
