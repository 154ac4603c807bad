use std::collections::BTreeMap;

use crate::model::{
    CompletionReason, DomainHalf, HalfScores, PlacementResult, ProficiencyLevel, Session,
    SkillCategory,
};
use crate::stopping::StoppingRule;

/// Composite-scale score at ability 0.
const SCALE_CENTER: f64 = 500.0;
/// Composite-scale points per unit of ability.
const SCALE_SLOPE: f64 = 163.0;
const SCALE_STEP: f64 = 5.0;
pub const MIN_SCALED_SCORE: u32 = 10;
pub const MAX_SCALED_SCORE: u32 = 990;

/// Map an ability onto the 10–990 reporting scale.
///
/// `500 + 163θ`, rounded to the nearest multiple of five (ties to even),
/// clamped to [10, 990].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn ability_to_score(ability: f64) -> u32 {
    let raw = SCALE_CENTER + ability * SCALE_SLOPE;
    let rounded = (raw / SCALE_STEP).round_ties_even() * SCALE_STEP;
    let clamped = rounded.clamp(f64::from(MIN_SCALED_SCORE), f64::from(MAX_SCALED_SCORE));
    clamped as u32
}

/// Half-scale score (5–495) for one domain half.
#[must_use]
pub fn ability_to_half_score(ability: f64) -> u32 {
    ability_to_score(ability) / 2
}

/// Standard error expressed in composite-scale points.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn confidence_interval(standard_error: f64) -> u32 {
    (standard_error * SCALE_SLOPE).round().max(0.0) as u32
}

/// Turns a finished response trajectory into a `PlacementResult`.
#[derive(Debug, Clone, Copy)]
pub struct ScoreFinalizer {
    stopping: StoppingRule,
}

impl ScoreFinalizer {
    #[must_use]
    pub fn new(stopping: StoppingRule) -> Self {
        Self { stopping }
    }

    /// Mean `ability_after` for every skill with at least one response.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn skill_scores(session: &Session) -> BTreeMap<SkillCategory, f64> {
        let mut sums: BTreeMap<SkillCategory, (f64, usize)> = BTreeMap::new();
        for response in session.responses() {
            let entry = sums.entry(response.skill).or_insert((0.0, 0));
            entry.0 += response.ability_after;
            entry.1 += 1;
        }
        sums.into_iter()
            .map(|(skill, (sum, n))| (skill, sum / n as f64))
            .collect()
    }

    /// Mean skill score across the skills of one half; 0.0 when none answered.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn half_ability(skill_scores: &BTreeMap<SkillCategory, f64>, half: DomainHalf) -> f64 {
        let values: Vec<f64> = skill_scores
            .iter()
            .filter(|(skill, _)| skill.half() == half)
            .map(|(_, score)| *score)
            .collect();
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Compute the final result; does not mutate the session.
    #[must_use]
    pub fn finalize(&self, session: &Session, reason: CompletionReason) -> PlacementResult {
        let skill_scores = Self::skill_scores(session);
        let half_scores = HalfScores {
            listening: ability_to_half_score(Self::half_ability(
                &skill_scores,
                DomainHalf::Listening,
            )),
            reading: ability_to_half_score(Self::half_ability(&skill_scores, DomainHalf::Reading)),
        };
        let composite_score = half_scores.total();
        let se = self.stopping.standard_error(session);

        PlacementResult {
            composite_score,
            half_scores,
            skill_scores,
            confidence_interval: confidence_interval(se),
            questions_answered: u32::try_from(session.answered_count()).unwrap_or(u32::MAX),
            level: ProficiencyLevel::from_score(composite_score),
            completion_reason: reason,
        }
    }
}
