use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::SkillCategory;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BalancerError {
    #[error("quota table is empty")]
    Empty,
    #[error("skill {0} appears more than once in the quota table")]
    DuplicateSkill(SkillCategory),
    #[error("quota table must allow at least one item")]
    ZeroTotal,
}

//
// ─── QUOTAS ────────────────────────────────────────────────────────────────────
//

/// Target number of items for one skill within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillQuota {
    pub skill: SkillCategory,
    pub target: u32,
}

impl SkillQuota {
    #[must_use]
    pub fn new(skill: SkillCategory, target: u32) -> Self {
        Self { skill, target }
    }
}

/// Default distribution across the nine skills; sums to 40.
#[must_use]
pub fn default_quotas() -> Vec<SkillQuota> {
    use SkillCategory::{Grm, L1, L2, L3, L4, R5, R6, R7, Voc};
    [
        (L1, 2),
        (L2, 3),
        (L3, 4),
        (L4, 3),
        (R5, 5),
        (R6, 3),
        (R7, 5),
        (Voc, 8),
        (Grm, 7),
    ]
    .into_iter()
    .map(|(skill, target)| SkillQuota::new(skill, target))
    .collect()
}

//
// ─── BALANCER ──────────────────────────────────────────────────────────────────
//

/// Keeps administered items spread across skills according to a quota table.
///
/// The recommended skill is the one with the lowest `answered / target`
/// ratio; ties go to the skill that comes first in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBalancer {
    quotas: Vec<SkillQuota>,
}

impl ContentBalancer {
    /// Build a balancer from a quota table.
    ///
    /// # Errors
    ///
    /// Returns `BalancerError` for an empty table, a duplicated skill, or a
    /// table whose targets sum to zero.
    pub fn new(mut quotas: Vec<SkillQuota>) -> Result<Self, BalancerError> {
        if quotas.is_empty() {
            return Err(BalancerError::Empty);
        }
        quotas.sort_by_key(|q| q.skill);
        if let Some(pair) = quotas.windows(2).find(|w| w[0].skill == w[1].skill) {
            return Err(BalancerError::DuplicateSkill(pair[0].skill));
        }
        if quotas.iter().all(|q| q.target == 0) {
            return Err(BalancerError::ZeroTotal);
        }
        Ok(Self { quotas })
    }

    #[must_use]
    pub fn quotas(&self) -> &[SkillQuota] {
        &self.quotas
    }

    /// Sum of all targets.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.quotas.iter().map(|q| q.target).sum()
    }

    #[must_use]
    pub fn target_for(&self, skill: SkillCategory) -> Option<u32> {
        self.quotas
            .iter()
            .find(|q| q.skill == skill)
            .map(|q| q.target)
    }

    /// Completion ratio of one quota; a zero target counts as complete.
    fn ratio(quota: &SkillQuota, counts: &BTreeMap<SkillCategory, u32>) -> f64 {
        let current = counts.get(&quota.skill).copied().unwrap_or(0);
        if quota.target == 0 {
            return 1.0;
        }
        f64::from(current) / f64::from(quota.target)
    }

    /// Skill to draw the next item from.
    #[must_use]
    pub fn next_skill(&self, counts: &BTreeMap<SkillCategory, u32>) -> SkillCategory {
        // `new` guarantees a non-empty table.
        self.ladder(counts)[0]
    }

    /// Every skill in the table, least complete first.
    ///
    /// The head is `next_skill`; the remaining rungs are the fallback order
    /// when a skill's bank is exhausted.
    #[must_use]
    pub fn ladder(&self, counts: &BTreeMap<SkillCategory, u32>) -> Vec<SkillCategory> {
        let mut ranked: Vec<(f64, SkillCategory)> = self
            .quotas
            .iter()
            .map(|q| (Self::ratio(q, counts), q.skill))
            .collect();
        ranked.sort_by(|a, b| match a.0.total_cmp(&b.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            other => other,
        });
        ranked.into_iter().map(|(_, skill)| skill).collect()
    }
}

impl Default for ContentBalancer {
    fn default() -> Self {
        Self {
            quotas: default_quotas(),
        }
    }
}
