//! Next-item selection: maximum Fisher information within the balancer's
//! preferred skill, with a small random tie-break.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use placement_core::irt::IrtModel;
use placement_core::model::{Item, ItemId, SkillCategory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use storage::repository::{ItemBank, StorageError};
use tracing::debug;

//
// ─── TIE-BREAK ─────────────────────────────────────────────────────────────────
//

/// Source of the small additive noise that breaks near-ties between items.
pub trait TieBreak: Send + Sync {
    fn jitter(&self) -> f64;
}

/// Uniform noise in `[0, max)` from a seedable `StdRng`.
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
    max: f64,
}

impl SeededJitter {
    /// Jitter seeded from the operating system.
    #[must_use]
    pub fn new(max: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
            max,
        }
    }

    /// Reproducible jitter for tests and replays.
    #[must_use]
    pub fn with_seed(seed: u64, max: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            max,
        }
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }
}

impl TieBreak for SeededJitter {
    fn jitter(&self) -> f64 {
        if self.max <= 0.0 || !self.max.is_finite() {
            return 0.0;
        }
        self.rng
            .lock()
            .map(|mut rng| rng.random_range(0.0..self.max))
            .unwrap_or(0.0)
    }
}

/// No noise: exact information ties go to the first candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl TieBreak for NoJitter {
    fn jitter(&self) -> f64 {
        0.0
    }
}

//
// ─── SELECTOR ──────────────────────────────────────────────────────────────────
//

/// Picks the most informative unanswered item for the current ability.
#[derive(Clone)]
pub struct ItemSelector {
    model: IrtModel,
    bank: Arc<dyn ItemBank>,
    tie_break: Arc<dyn TieBreak>,
    scan_window: usize,
}

impl ItemSelector {
    #[must_use]
    pub fn new(
        model: IrtModel,
        bank: Arc<dyn ItemBank>,
        tie_break: Arc<dyn TieBreak>,
        scan_window: usize,
    ) -> Self {
        Self {
            model,
            bank,
            tie_break,
            scan_window,
        }
    }

    /// Select the next item.
    ///
    /// Walks `skill_ladder` (most-needed skill first) and scores the first
    /// non-empty candidate window. When every rung is empty, any active
    /// unanswered item qualifies. `Ok(None)` means the bank is exhausted for
    /// this session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the bank cannot be queried.
    pub async fn select(
        &self,
        ability: f64,
        answered: &HashSet<ItemId>,
        skill_ladder: &[SkillCategory],
    ) -> Result<Option<Item>, StorageError> {
        for skill in skill_ladder {
            let candidates = self
                .bank
                .fetch_active_unanswered(*skill, answered, self.scan_window)
                .await?;
            if let Some(item) = self.best_of(ability, answered, candidates) {
                debug!(item_id = %item.id(), skill = %skill, ability, "selected item");
                return Ok(Some(item));
            }
            debug!(skill = %skill, "no candidates for skill, trying next");
        }

        let candidates = self
            .bank
            .fetch_any_active_unanswered(answered, self.scan_window)
            .await?;
        let picked = self.best_of(ability, answered, candidates);
        match &picked {
            Some(item) => debug!(item_id = %item.id(), ability, "selected fallback item"),
            None => debug!(ability, "item bank exhausted"),
        }
        Ok(picked)
    }

    /// Argmax of information plus jitter; the first candidate wins exact ties.
    fn best_of(
        &self,
        ability: f64,
        answered: &HashSet<ItemId>,
        candidates: Vec<Item>,
    ) -> Option<Item> {
        let mut best: Option<(f64, Item)> = None;
        for item in candidates {
            if answered.contains(&item.id()) || !item.is_active() {
                continue;
            }
            let score = self.model.information_for(ability, item.params()) + self.tie_break.jitter();
            match &best {
                Some((top, _)) if score <= *top => {}
                _ => best = Some((score, item)),
            }
        }
        best.map(|(_, item)| item)
    }
}
