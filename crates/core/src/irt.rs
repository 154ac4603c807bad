use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum IrtParamsError {
    #[error("discrimination (a) must be finite and > 0, got {provided}")]
    InvalidDiscrimination { provided: f64 },
    #[error("difficulty (b) must be within [-3, 3], got {provided}")]
    InvalidDifficulty { provided: f64 },
    #[error("guessing (c) must be within [0, 1), got {provided}")]
    InvalidGuessing { provided: f64 },
}

//
// ─── PARAMETERS ────────────────────────────────────────────────────────────────
//

/// Calibrated three-parameter logistic item parameters.
///
/// * `a` - discrimination (> 0)
/// * `b` - difficulty, on the same [-3, 3] scale as ability
/// * `c` - pseudo-guessing floor in [0, 1)
///
/// # Examples
///
/// ```
/// # use placement_core::irt::IrtParams;
/// let params = IrtParams::new(1.2, -0.5, 0.25)?;
/// assert_eq!(params.b(), -0.5);
/// # Ok::<(), placement_core::irt::IrtParamsError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawIrtParams")]
pub struct IrtParams {
    a: f64,
    b: f64,
    c: f64,
}

/// Unchecked wire form; loading goes through `IrtParams::new`.
#[derive(Deserialize)]
struct RawIrtParams {
    a: f64,
    b: f64,
    c: f64,
}

impl TryFrom<RawIrtParams> for IrtParams {
    type Error = IrtParamsError;

    fn try_from(raw: RawIrtParams) -> Result<Self, Self::Error> {
        Self::new(raw.a, raw.b, raw.c)
    }
}

impl IrtParams {
    pub const DEFAULT_DISCRIMINATION: f64 = 1.0;
    pub const DEFAULT_GUESSING: f64 = 0.25;

    /// Validates and builds a parameter set.
    ///
    /// # Errors
    ///
    /// Returns `IrtParamsError` when any parameter is out of its domain.
    pub fn new(a: f64, b: f64, c: f64) -> Result<Self, IrtParamsError> {
        if !a.is_finite() || a <= 0.0 {
            return Err(IrtParamsError::InvalidDiscrimination { provided: a });
        }
        if !b.is_finite() || !(-3.0..=3.0).contains(&b) {
            return Err(IrtParamsError::InvalidDifficulty { provided: b });
        }
        if !c.is_finite() || !(0.0..1.0).contains(&c) {
            return Err(IrtParamsError::InvalidGuessing { provided: c });
        }
        Ok(Self { a, b, c })
    }

    /// Parameters with default discrimination and guessing for a given difficulty.
    ///
    /// # Errors
    ///
    /// Returns `IrtParamsError::InvalidDifficulty` if `b` is outside [-3, 3].
    pub fn with_difficulty(b: f64) -> Result<Self, IrtParamsError> {
        Self::new(Self::DEFAULT_DISCRIMINATION, b, Self::DEFAULT_GUESSING)
    }

    #[must_use]
    pub fn a(&self) -> f64 {
        self.a
    }

    #[must_use]
    pub fn b(&self) -> f64 {
        self.b
    }

    #[must_use]
    pub fn c(&self) -> f64 {
        self.c
    }
}

impl Default for IrtParams {
    fn default() -> Self {
        Self {
            a: Self::DEFAULT_DISCRIMINATION,
            b: 0.0,
            c: Self::DEFAULT_GUESSING,
        }
    }
}

//
// ─── MODEL ─────────────────────────────────────────────────────────────────────
//

/// Exponent magnitude past which `exp` is not evaluated.
const EXPONENT_LIMIT: f64 = 700.0;

/// Stateless 3PL item response model.
///
/// Cheap to copy; inject one wherever probabilities or information are needed
/// instead of sharing a process-wide instance.
///
/// # Examples
///
/// ```
/// # use placement_core::irt::IrtModel;
/// let model = IrtModel::new();
/// let p = model.probability_correct(0.0, 0.0, 1.0, 0.25);
/// assert!((p - 0.625).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrtModel;

impl IrtModel {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// `P = c + (1-c) / (1 + exp(-a(θ-b)))`.
    ///
    /// Returns `c` once the exponent exceeds +700 and `1.0` once it drops
    /// below -700.
    #[must_use]
    pub fn probability_correct(self, ability: f64, b: f64, a: f64, c: f64) -> f64 {
        let exponent = -a * (ability - b);
        if exponent > EXPONENT_LIMIT {
            return c;
        }
        if exponent < -EXPONENT_LIMIT {
            return 1.0;
        }
        c + (1.0 - c) / (1.0 + exponent.exp())
    }

    /// Fisher information `a²(P-c)²(1-P) / ((1-c)² P)`.
    ///
    /// Zero whenever `P <= c` or `P >= 1`.
    #[must_use]
    pub fn information(self, ability: f64, b: f64, a: f64, c: f64) -> f64 {
        let p = self.probability_correct(ability, b, a, c);
        if p <= c || p >= 1.0 {
            return 0.0;
        }
        let q = 1.0 - p;
        let numerator = a.powi(2) * (p - c).powi(2) * q;
        let denominator = (1.0 - c).powi(2) * p;
        if denominator == 0.0 {
            return 0.0;
        }
        numerator / denominator
    }

    /// `probability_correct` for a parameter set.
    #[must_use]
    pub fn probability_for(self, ability: f64, params: &IrtParams) -> f64 {
        self.probability_correct(ability, params.b, params.a, params.c)
    }

    /// `information` for a parameter set.
    #[must_use]
    pub fn information_for(self, ability: f64, params: &IrtParams) -> f64 {
        self.information(ability, params.b, params.a, params.c)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn probability_at_difficulty_matches_formula() {
        let model = IrtModel::new();
        let p = model.probability_correct(0.0, 0.0, 1.0, 0.25);
        assert!((p - 0.625).abs() < 1e-3);
    }

    #[test]
    fn probability_saturates_at_extremes() {
        let model = IrtModel::new();
        assert_eq!(model.probability_correct(-3.0, 3.0, 1000.0, 0.2), 0.2);
        assert_eq!(model.probability_correct(3.0, -3.0, 1000.0, 0.2), 1.0);
    }

    #[test]
    fn information_is_zero_at_saturation() {
        let model = IrtModel::new();
        assert_eq!(model.information(-3.0, 3.0, 1000.0, 0.25), 0.0);
        assert_eq!(model.information(3.0, -3.0, 1000.0, 0.25), 0.0);
    }

    #[test]
    fn information_peaks_near_difficulty() {
        let model = IrtModel::new();
        for b in [-2.0, -0.5, 0.0, 1.0, 2.0] {
            let mut best = (f64::MIN, 0.0);
            let mut theta = b - 3.0;
            while theta <= b + 3.0 {
                let info = model.information(theta, b, 1.5, 0.0);
                if info > best.0 {
                    best = (info, theta);
                }
                theta += 0.01;
            }
            assert!((best.1 - b).abs() < 0.05, "b={b} argmax={}", best.1);
        }
    }

    #[test]
    fn guessing_shifts_peak_slightly_above_difficulty() {
        let model = IrtModel::new();
        let b = 0.0;
        let mut best = (f64::MIN, 0.0);
        let mut theta = -3.0;
        while theta <= 3.0 {
            let info = model.information(theta, b, 1.0, 0.25);
            if info > best.0 {
                best = (info, theta);
            }
            theta += 0.01;
        }
        assert!(best.1 >= b && best.1 - b < 0.5);
    }

    #[test]
    fn params_validation() {
        assert!(IrtParams::new(0.0, 0.0, 0.25).is_err());
        assert!(IrtParams::new(1.0, 3.5, 0.25).is_err());
        assert!(IrtParams::new(1.0, 0.0, 1.0).is_err());
        assert!(IrtParams::new(1.0, 0.0, f64::NAN).is_err());
        assert_eq!(IrtParams::default(), IrtParams::with_difficulty(0.0).unwrap());
    }

    #[test]
    fn deserializing_params_revalidates() {
        let ok: IrtParams = serde_json::from_str(r#"{"a":1.3,"b":-0.4,"c":0.2}"#).unwrap();
        assert_eq!(ok, IrtParams::new(1.3, -0.4, 0.2).unwrap());

        for bad in [
            r#"{"a":0.0,"b":0.0,"c":0.25}"#,
            r#"{"a":1.0,"b":3.5,"c":0.25}"#,
            r#"{"a":1.0,"b":0.0,"c":1.0}"#,
        ] {
            assert!(serde_json::from_str::<IrtParams>(bad).is_err(), "{bad}");
        }
    }

    proptest! {
        #[test]
        fn probability_is_bounded_and_monotonic(
            theta in -3.0f64..3.0,
            delta in 0.0f64..2.0,
            a in 0.05f64..4.0,
            b in -3.0f64..3.0,
            c in 0.0f64..0.99,
        ) {
            let model = IrtModel::new();
            let p1 = model.probability_correct(theta, b, a, c);
            let p2 = model.probability_correct(theta + delta, b, a, c);
            prop_assert!((0.0..=1.0).contains(&p1));
            prop_assert!((0.0..=1.0).contains(&p2));
            prop_assert!(p2 + 1e-12 >= p1);
        }

        #[test]
        fn information_is_non_negative(
            theta in -3.0f64..3.0,
            a in 0.05f64..4.0,
            b in -3.0f64..3.0,
            c in 0.0f64..0.99,
        ) {
            let info = IrtModel::new().information(theta, b, a, c);
            prop_assert!(info >= 0.0);
            prop_assert!(info.is_finite());
        }
    }
}
