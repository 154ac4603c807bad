use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SkillError {
    #[error("unknown skill category: {0}")]
    UnknownSkill(String),

    #[error("difficulty band must be between 1 and 6, got {0}")]
    InvalidBand(u8),
}

//
// ─── DOMAIN HALF ───────────────────────────────────────────────────────────────
//

/// The two halves a composite score is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainHalf {
    Listening,
    Reading,
}

//
// ─── SKILL CATEGORY ────────────────────────────────────────────────────────────
//

/// Skill categories an item can be tagged with.
///
/// The declaration order is the fixed enumeration order used to break ties
/// in content balancing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SkillCategory {
    /// Listening - photographs
    L1,
    /// Listening - question & response
    L2,
    /// Listening - conversations
    L3,
    /// Listening - talks
    L4,
    /// Reading - incomplete sentences
    R5,
    /// Reading - text completion
    R6,
    /// Reading - comprehension
    R7,
    /// Vocabulary
    #[serde(rename = "VOC")]
    Voc,
    /// Grammar
    #[serde(rename = "GRM")]
    Grm,
}

impl SkillCategory {
    /// Every category, in enumeration order.
    pub const ALL: [SkillCategory; 9] = [
        SkillCategory::L1,
        SkillCategory::L2,
        SkillCategory::L3,
        SkillCategory::L4,
        SkillCategory::R5,
        SkillCategory::R6,
        SkillCategory::R7,
        SkillCategory::Voc,
        SkillCategory::Grm,
    ];

    /// Short code used in storage and configuration files.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            SkillCategory::L1 => "L1",
            SkillCategory::L2 => "L2",
            SkillCategory::L3 => "L3",
            SkillCategory::L4 => "L4",
            SkillCategory::R5 => "R5",
            SkillCategory::R6 => "R6",
            SkillCategory::R7 => "R7",
            SkillCategory::Voc => "VOC",
            SkillCategory::Grm => "GRM",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            SkillCategory::L1 => "Listening - Photos",
            SkillCategory::L2 => "Listening - Question & Response",
            SkillCategory::L3 => "Listening - Conversations",
            SkillCategory::L4 => "Listening - Talks",
            SkillCategory::R5 => "Reading - Incomplete Sentences",
            SkillCategory::R6 => "Reading - Text Completion",
            SkillCategory::R7 => "Reading - Reading Comprehension",
            SkillCategory::Voc => "Vocabulary",
            SkillCategory::Grm => "Grammar",
        }
    }

    /// Which composite half this skill contributes to.
    #[must_use]
    pub fn half(self) -> DomainHalf {
        match self {
            SkillCategory::L1 | SkillCategory::L2 | SkillCategory::L3 | SkillCategory::L4 => {
                DomainHalf::Listening
            }
            _ => DomainHalf::Reading,
        }
    }

    /// Position in the enumeration order.
    #[must_use]
    pub fn ordinal(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SkillCategory {
    type Err = SkillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        SkillCategory::ALL
            .into_iter()
            .find(|skill| skill.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| SkillError::UnknownSkill(s.to_owned()))
    }
}

//
// ─── DIFFICULTY BAND ───────────────────────────────────────────────────────────
//

/// Ordinal difficulty band (1 = beginner … 6 = expert).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DifficultyBand(u8);

impl DifficultyBand {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;

    /// Creates a band, rejecting values outside 1–6.
    ///
    /// # Errors
    ///
    /// Returns `SkillError::InvalidBand` when `value` is out of range.
    pub fn new(value: u8) -> Result<Self, SkillError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SkillError::InvalidBand(value))
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// All six bands in ascending order.
    pub fn all() -> impl Iterator<Item = DifficultyBand> {
        (Self::MIN..=Self::MAX).map(DifficultyBand)
    }

    /// Nominal IRT difficulty (b) for items calibrated into this band.
    #[must_use]
    pub fn nominal_irt_difficulty(self) -> f64 {
        match self.0 {
            1 => -2.0,
            2 => -1.0,
            3 => 0.0,
            4 => 0.8,
            5 => 1.5,
            _ => 2.2,
        }
    }
}

impl TryFrom<u8> for DifficultyBand {
    type Error = SkillError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DifficultyBand> for u8 {
    fn from(band: DifficultyBand) -> Self {
        band.0
    }
}
