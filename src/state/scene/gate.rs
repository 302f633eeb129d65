//! Arithmetic challenge keeping children out of grown-up actions.

use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;

use super::GateAction;

const OPERAND_RANGE: std::ops::RangeInclusive<u32> = 1..=5;

/// `left + right = ?` shown to the person asking for access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct GateQuestion {
    /// First operand.
    pub left: u32,
    /// Second operand.
    pub right: u32,
}

impl GateQuestion {
    /// Draw a fresh question.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self {
            left: rng.random_range(OPERAND_RANGE),
            right: rng.random_range(OPERAND_RANGE),
        }
    }

    /// Expected answer.
    pub fn answer(self) -> u32 {
        self.left + self.right
    }
}

/// Open challenge guarding a pending action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentGate {
    action: GateAction,
    question: GateQuestion,
}

impl ParentGate {
    /// Open a gate for `action` with a random question.
    pub fn new(action: GateAction) -> Self {
        Self::with_question(action, GateQuestion::random())
    }

    /// Open a gate with a known question.
    pub fn with_question(action: GateAction, question: GateQuestion) -> Self {
        Self { action, question }
    }

    /// Question currently shown.
    pub fn question(&self) -> GateQuestion {
        self.question
    }

    /// Action unlocked by a right answer.
    pub fn action(&self) -> &GateAction {
        &self.action
    }

    /// Whether `answer` solves the current question.
    pub fn check(&self, answer: u32) -> bool {
        self.question.answer() == answer
    }

    /// Swap in a new question after a wrong answer.
    pub fn regenerate(&mut self) {
        self.question = GateQuestion::random();
    }
}
