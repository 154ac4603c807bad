use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ids::UserId;
use crate::model::result::{PlacementResult, ProficiencyLevel};
use crate::model::skill::SkillCategory;

/// Confidence attached to proficiency values that come from a placement test.
pub const PLACEMENT_CONFIDENCE: f64 = 0.8;

/// How many skills are reported as weak and as strong.
const HIGHLIGHTED_SKILLS: usize = 3;

/// Proficiency estimate for one skill, on a 0–1 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillProficiency {
    pub level: f64,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

/// Learner profile fed by placement results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    user_id: UserId,
    estimated_score: u32,
    level: ProficiencyLevel,
    skill_proficiency: BTreeMap<SkillCategory, SkillProficiency>,
    weak_skills: Vec<SkillCategory>,
    strong_skills: Vec<SkillCategory>,
}

impl LearnerProfile {
    /// Profile for a learner who has not been placed yet.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            estimated_score: 450,
            level: ProficiencyLevel::Intermediate,
            skill_proficiency: BTreeMap::new(),
            weak_skills: Vec::new(),
            strong_skills: Vec::new(),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn estimated_score(&self) -> u32 {
        self.estimated_score
    }

    #[must_use]
    pub fn level(&self) -> ProficiencyLevel {
        self.level
    }

    #[must_use]
    pub fn skill_proficiency(&self) -> &BTreeMap<SkillCategory, SkillProficiency> {
        &self.skill_proficiency
    }

    /// Proficiency for a skill, 0.5 when nothing is known.
    #[must_use]
    pub fn skill_level(&self, skill: SkillCategory) -> f64 {
        self.skill_proficiency
            .get(&skill)
            .map_or(0.5, |p| p.level)
    }

    #[must_use]
    pub fn weak_skills(&self) -> &[SkillCategory] {
        &self.weak_skills
    }

    #[must_use]
    pub fn strong_skills(&self) -> &[SkillCategory] {
        &self.strong_skills
    }

    /// Overwrite score, level and per-skill proficiency from a placement result.
    ///
    /// Skill ability θ maps to proficiency `(θ + 3) / 6`, clamped to [0, 1].
    pub fn apply_result(&mut self, result: &PlacementResult, at: DateTime<Utc>) {
        self.estimated_score = result.composite_score;
        self.level = result.level;

        for (skill, ability) in &result.skill_scores {
            let level = ((ability + 3.0) / 6.0).clamp(0.0, 1.0);
            self.skill_proficiency.insert(
                *skill,
                SkillProficiency {
                    level: (level * 1000.0).round() / 1000.0,
                    confidence: PLACEMENT_CONFIDENCE,
                    updated_at: at,
                },
            );
        }

        self.recalculate_weak_strong();
    }

    fn recalculate_weak_strong(&mut self) {
        if self.skill_proficiency.is_empty() {
            return;
        }
        let mut ranked: Vec<(SkillCategory, f64)> = self
            .skill_proficiency
            .iter()
            .map(|(skill, p)| (*skill, p.level))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        self.weak_skills = ranked
            .iter()
            .take(HIGHLIGHTED_SKILLS)
            .map(|(skill, _)| *skill)
            .collect();
        self.strong_skills = ranked
            .iter()
            .rev()
            .take(HIGHLIGHTED_SKILLS)
            .map(|(skill, _)| *skill)
            .collect();
    }
}
