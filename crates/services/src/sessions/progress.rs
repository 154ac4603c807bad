use placement_core::model::{AnswerKey, Item, PlacementResult, SessionId};
use serde::Serialize;

/// Where a learner stands within an in-progress session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionProgress {
    pub answered: usize,
    pub min_items: usize,
    pub max_items: usize,
    pub can_finish: bool,
    /// Current ability on the 10–990 reporting scale.
    pub estimated_score: u32,
    pub standard_error: f64,
}

/// A session with the item the learner should see now.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub item: Item,
    pub progress: SessionProgress,
}

/// Immediate feedback on a submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnswerFeedback {
    pub is_correct: bool,
    pub correct_key: AnswerKey,
    pub ability: f64,
}

/// What happens after an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Continue {
        feedback: AnswerFeedback,
        next_item: Item,
        progress: SessionProgress,
    },
    Completed {
        feedback: AnswerFeedback,
        result: PlacementResult,
    },
}

impl AnswerOutcome {
    #[must_use]
    pub fn feedback(&self) -> &AnswerFeedback {
        match self {
            AnswerOutcome::Continue { feedback, .. } | AnswerOutcome::Completed { feedback, .. } => {
                feedback
            }
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, AnswerOutcome::Completed { .. })
    }

    #[must_use]
    pub fn result(&self) -> Option<&PlacementResult> {
        match self {
            AnswerOutcome::Completed { result, .. } => Some(result),
            AnswerOutcome::Continue { .. } => None,
        }
    }

    #[must_use]
    pub fn next_item(&self) -> Option<&Item> {
        match self {
            AnswerOutcome::Continue { next_item, .. } => Some(next_item),
            AnswerOutcome::Completed { .. } => None,
        }
    }
}
