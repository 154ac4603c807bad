use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::irt::{IrtParams, IrtParamsError};
use crate::model::ids::ItemId;
use crate::model::skill::{DifficultyBand, SkillCategory};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed answer key: {raw:?}")]
pub struct ParseKeyError {
    pub raw: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ItemError {
    #[error(transparent)]
    Params(#[from] IrtParamsError),

    #[error("an item needs at least two options, got {0}")]
    TooFewOptions(usize),

    #[error("option set contains duplicate key {0}")]
    DuplicateOption(AnswerKey),

    #[error("correct key {0} is not one of the item's options")]
    CorrectKeyNotOffered(AnswerKey),

    #[error("times_correct ({correct}) exceeds times_shown ({shown})")]
    InconsistentCounters { shown: u64, correct: u64 },
}

//
// ─── ANSWER KEY ────────────────────────────────────────────────────────────────
//

/// Multiple-choice option label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnswerKey {
    A,
    B,
    C,
    D,
}

impl AnswerKey {
    pub const ALL: [AnswerKey; 4] = [AnswerKey::A, AnswerKey::B, AnswerKey::C, AnswerKey::D];

    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            AnswerKey::A => 'A',
            AnswerKey::B => 'B',
            AnswerKey::C => 'C',
            AnswerKey::D => 'D',
        }
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for AnswerKey {
    type Err = ParseKeyError;

    /// Accepts a single letter, case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(AnswerKey::A),
            "B" => Ok(AnswerKey::B),
            "C" => Ok(AnswerKey::C),
            "D" => Ok(AnswerKey::D),
            _ => Err(ParseKeyError { raw: s.to_owned() }),
        }
    }
}

//
// ─── ITEM ──────────────────────────────────────────────────────────────────────
//

/// A calibrated placement item.
///
/// Everything except the usage counters is fixed once calibrated; counters are
/// owned by the item bank and only read here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    skill: SkillCategory,
    band: DifficultyBand,
    params: IrtParams,
    options: Vec<AnswerKey>,
    correct_key: AnswerKey,
    times_shown: u64,
    times_correct: u64,
    is_active: bool,
}

impl Item {
    /// Build a new, active item with zeroed usage counters.
    ///
    /// # Errors
    ///
    /// Returns `ItemError` if the option set is too small, has duplicates,
    /// or does not contain `correct_key`.
    pub fn new(
        id: ItemId,
        skill: SkillCategory,
        band: DifficultyBand,
        params: IrtParams,
        options: Vec<AnswerKey>,
        correct_key: AnswerKey,
    ) -> Result<Self, ItemError> {
        Self::from_persisted(id, skill, band, params, options, correct_key, 0, 0, true)
    }

    /// Rehydrate an item from storage, re-checking every invariant.
    ///
    /// # Errors
    ///
    /// Returns `ItemError` on invalid options or inconsistent counters.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: ItemId,
        skill: SkillCategory,
        band: DifficultyBand,
        params: IrtParams,
        options: Vec<AnswerKey>,
        correct_key: AnswerKey,
        times_shown: u64,
        times_correct: u64,
        is_active: bool,
    ) -> Result<Self, ItemError> {
        if options.len() < 2 {
            return Err(ItemError::TooFewOptions(options.len()));
        }
        for (idx, key) in options.iter().enumerate() {
            if options[..idx].contains(key) {
                return Err(ItemError::DuplicateOption(*key));
            }
        }
        if !options.contains(&correct_key) {
            return Err(ItemError::CorrectKeyNotOffered(correct_key));
        }
        if times_correct > times_shown {
            return Err(ItemError::InconsistentCounters {
                shown: times_shown,
                correct: times_correct,
            });
        }

        Ok(Self {
            id,
            skill,
            band,
            params,
            options,
            correct_key,
            times_shown,
            times_correct,
            is_active,
        })
    }

    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    #[must_use]
    pub fn skill(&self) -> SkillCategory {
        self.skill
    }

    #[must_use]
    pub fn band(&self) -> DifficultyBand {
        self.band
    }

    #[must_use]
    pub fn params(&self) -> &IrtParams {
        &self.params
    }

    #[must_use]
    pub fn options(&self) -> &[AnswerKey] {
        &self.options
    }

    #[must_use]
    pub fn correct_key(&self) -> AnswerKey {
        self.correct_key
    }

    #[must_use]
    pub fn times_shown(&self) -> u64 {
        self.times_shown
    }

    #[must_use]
    pub fn times_correct(&self) -> u64 {
        self.times_correct
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Whether `key` is one of the options shown for this item.
    #[must_use]
    pub fn offers(&self, key: AnswerKey) -> bool {
        self.options.contains(&key)
    }

    #[must_use]
    pub fn is_correct(&self, key: AnswerKey) -> bool {
        key == self.correct_key
    }

    /// Share of learners who missed the item, once it has been shown ten times.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn empirical_difficulty(&self) -> Option<f64> {
        if self.times_shown < 10 {
            return None;
        }
        Some(1.0 - self.times_correct as f64 / self.times_shown as f64)
    }

    /// Copy of this item with different usage counters.
    ///
    /// # Errors
    ///
    /// Returns `ItemError::InconsistentCounters` if `times_correct > times_shown`.
    pub fn with_counters(&self, times_shown: u64, times_correct: u64) -> Result<Self, ItemError> {
        if times_correct > times_shown {
            return Err(ItemError::InconsistentCounters {
                shown: times_shown,
                correct: times_correct,
            });
        }
        Ok(Self {
            times_shown,
            times_correct,
            ..self.clone()
        })
    }

    #[must_use]
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}
