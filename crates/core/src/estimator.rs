use crate::irt::{IrtModel, IrtParams};

/// Lower bound of the ability scale.
pub const MIN_ABILITY: f64 = -3.0;
/// Upper bound of the ability scale.
pub const MAX_ABILITY: f64 = 3.0;

/// Keeps `P` away from 0 and 1 inside the gradient denominators.
const PROBABILITY_EPSILON: f64 = 1e-9;

/// Online ability update after a single response.
///
/// This is a damped gradient step on the 3PL log-likelihood, not a full
/// maximum-likelihood solve. The step size shrinks as more items are answered:
/// `η(n) = 0.5 / (1 + 0.1 n)`.
///
/// # Examples
///
/// ```
/// # use placement_core::estimator::AbilityEstimator;
/// # use placement_core::irt::IrtParams;
/// let estimator = AbilityEstimator::default();
/// let params = IrtParams::default();
/// let up = estimator.update(0.0, &params, true, 0);
/// let down = estimator.update(0.0, &params, false, 0);
/// assert!(up > 0.0 && down < 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AbilityEstimator {
    model: IrtModel,
}

impl AbilityEstimator {
    #[must_use]
    pub fn new(model: IrtModel) -> Self {
        Self { model }
    }

    /// Step size after `n_answered` previous responses.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn step_size(n_answered: usize) -> f64 {
        0.5 / (1.0 + 0.1 * n_answered as f64)
    }

    /// Gradient of the response log-likelihood at `ability`.
    ///
    /// Correct: `a(1-P)(P-c) / (P(1-c))`; incorrect: `-a(P-c) / ((1-P)(1-c))`.
    #[must_use]
    pub fn gradient(&self, ability: f64, params: &IrtParams, is_correct: bool) -> f64 {
        let (a, c) = (params.a(), params.c());
        let p = self
            .model
            .probability_for(ability, params)
            .clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);

        if is_correct {
            a * (1.0 - p) * (p - c) / (p * (1.0 - c))
        } else {
            -a * (p - c) / ((1.0 - p) * (1.0 - c))
        }
    }

    /// New ability after answering an item with `params`.
    ///
    /// Always within [-3, 3]; a non-finite step leaves the ability unchanged.
    #[must_use]
    pub fn update(
        &self,
        ability: f64,
        params: &IrtParams,
        is_correct: bool,
        n_answered: usize,
    ) -> f64 {
        let current = if ability.is_finite() {
            ability.clamp(MIN_ABILITY, MAX_ABILITY)
        } else {
            0.0
        };
        let step = Self::step_size(n_answered) * self.gradient(current, params, is_correct);
        let next = current + step;
        if !next.is_finite() {
            return current;
        }
        next.clamp(MIN_ABILITY, MAX_ABILITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn step_size_decreases() {
        assert!((AbilityEstimator::step_size(0) - 0.5).abs() < 1e-12);
        assert!((AbilityEstimator::step_size(10) - 0.25).abs() < 1e-12);
        assert!(AbilityEstimator::step_size(30) < AbilityEstimator::step_size(29));
    }

    #[test]
    fn first_correct_answer_at_matching_difficulty() {
        // P = 0.625, g = 1 * 0.375 * 0.375 / (0.625 * 0.75) = 0.3
        let est = AbilityEstimator::default();
        let next = est.update(0.0, &IrtParams::default(), true, 0);
        assert!((next - 0.15).abs() < 1e-9);
    }

    #[test]
    fn first_wrong_answer_at_matching_difficulty() {
        // g = -(0.375) / (0.375 * 0.75) = -1.3333
        let est = AbilityEstimator::default();
        let next = est.update(0.0, &IrtParams::default(), false, 0);
        assert!((next + 0.5 / 0.75).abs() < 1e-9);
    }

    #[test]
    fn saturated_probability_does_not_blow_up() {
        let est = AbilityEstimator::default();
        let easy = IrtParams::new(1000.0, -3.0, 0.0).unwrap();
        let hard = IrtParams::new(1000.0, 3.0, 0.0).unwrap();

        let after_miss = est.update(3.0, &easy, false, 0);
        assert!(after_miss.is_finite());
        assert!((MIN_ABILITY..=MAX_ABILITY).contains(&after_miss));

        let after_hit = est.update(-3.0, &hard, true, 0);
        assert!(after_hit.is_finite());
        assert!((MIN_ABILITY..=MAX_ABILITY).contains(&after_hit));
    }

    #[test]
    fn non_finite_input_is_recovered() {
        let est = AbilityEstimator::default();
        let next = est.update(f64::NAN, &IrtParams::default(), true, 3);
        assert!(next.is_finite());
    }

    proptest! {
        #[test]
        fn update_stays_within_scale(
            ability in -3.0f64..=3.0,
            a in 0.01f64..50.0,
            b in -3.0f64..=3.0,
            c in 0.0f64..0.999,
            is_correct in any::<bool>(),
            n in 0usize..200,
        ) {
            let params = IrtParams::new(a, b, c).unwrap();
            let next = AbilityEstimator::default().update(ability, &params, is_correct, n);
            prop_assert!(next.is_finite());
            prop_assert!((MIN_ABILITY..=MAX_ABILITY).contains(&next));
        }

        #[test]
        fn correct_never_lowers_and_incorrect_never_raises(
            ability in -3.0f64..=3.0,
            a in 0.1f64..3.0,
            b in -3.0f64..=3.0,
            c in 0.0f64..0.5,
        ) {
            let params = IrtParams::new(a, b, c).unwrap();
            let est = AbilityEstimator::default();
            prop_assert!(est.update(ability, &params, true, 5) >= ability);
            prop_assert!(est.update(ability, &params, false, 5) <= ability);
        }
    }
}
