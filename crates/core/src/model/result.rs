use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::skill::SkillCategory;

/// Why a session reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionReason {
    /// Hard item cap reached.
    MaxItems,
    /// Standard error dropped to the configured threshold.
    PrecisionReached,
    /// The bank ran out of eligible items before the stopping rule fired.
    BankExhausted,
    /// The learner asked to finish after the minimum item count.
    FinishedEarly,
}

/// Coarse placement level derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProficiencyLevel {
    Beginner,
    Elementary,
    Intermediate,
    UpperIntermediate,
    Advanced,
    Expert,
}

impl ProficiencyLevel {
    /// Band a composite score falls into.
    #[must_use]
    pub fn from_score(composite: u32) -> Self {
        match composite {
            0..300 => ProficiencyLevel::Beginner,
            300..400 => ProficiencyLevel::Elementary,
            400..600 => ProficiencyLevel::Intermediate,
            600..800 => ProficiencyLevel::UpperIntermediate,
            800..900 => ProficiencyLevel::Advanced,
            _ => ProficiencyLevel::Expert,
        }
    }

    /// Ordinal matching the item difficulty bands (1–6).
    #[must_use]
    pub fn ordinal(self) -> u8 {
        match self {
            ProficiencyLevel::Beginner => 1,
            ProficiencyLevel::Elementary => 2,
            ProficiencyLevel::Intermediate => 3,
            ProficiencyLevel::UpperIntermediate => 4,
            ProficiencyLevel::Advanced => 5,
            ProficiencyLevel::Expert => 6,
        }
    }
}

/// Scaled scores for the listening and reading halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfScores {
    pub listening: u32,
    pub reading: u32,
}

impl HalfScores {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.listening + self.reading
    }
}

/// Final outcome of a placement session.
///
/// Computed once when the session completes and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementResult {
    pub composite_score: u32,
    pub half_scores: HalfScores,
    /// Mean `ability_after` per skill that received at least one response.
    pub skill_scores: BTreeMap<SkillCategory, f64>,
    /// Half-width of the score interval, on the composite scale.
    pub confidence_interval: u32,
    pub questions_answered: u32,
    pub level: ProficiencyLevel,
    pub completion_reason: CompletionReason,
}
