use crate::irt::IrtModel;
use crate::model::Session;

/// Standard error reported when no information has been accumulated.
pub const MAX_STANDARD_ERROR: f64 = 3.0;

/// Decides when a session has measured enough.
///
/// Stops unconditionally at `max_items`, never before `min_items`, and in
/// between once the standard error falls to `se_threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingRule {
    model: IrtModel,
    min_items: usize,
    max_items: usize,
    se_threshold: f64,
}

impl StoppingRule {
    /// Callers are expected to pass validated limits (see `EngineConfig`).
    #[must_use]
    pub fn new(model: IrtModel, min_items: usize, max_items: usize, se_threshold: f64) -> Self {
        Self {
            model,
            min_items,
            max_items,
            se_threshold,
        }
    }

    #[must_use]
    pub fn min_items(&self) -> usize {
        self.min_items
    }

    #[must_use]
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    #[must_use]
    pub fn se_threshold(&self) -> f64 {
        self.se_threshold
    }

    /// `1 / sqrt(Σ I(θ))` over every response, evaluated at the current ability.
    ///
    /// Returns `MAX_STANDARD_ERROR` when the information sum is zero.
    #[must_use]
    pub fn standard_error(&self, session: &Session) -> f64 {
        let ability = session.ability();
        let total: f64 = session
            .responses()
            .iter()
            .map(|r| self.model.information_for(ability, &r.params))
            .sum();
        if total <= 0.0 || !total.is_finite() {
            return MAX_STANDARD_ERROR;
        }
        1.0 / total.sqrt()
    }

    #[must_use]
    pub fn should_stop(&self, session: &Session) -> bool {
        let answered = session.answered_count();
        if answered >= self.max_items {
            return true;
        }
        if answered < self.min_items {
            return false;
        }
        self.standard_error(session) <= self.se_threshold
    }

    /// Whether the stop at this point is due to the hard cap.
    #[must_use]
    pub fn at_cap(&self, session: &Session) -> bool {
        session.answered_count() >= self.max_items
    }

    /// Whether enough items were answered to allow finishing early.
    #[must_use]
    pub fn can_finish(&self, session: &Session) -> bool {
        session.answered_count() >= self.min_items
    }
}
