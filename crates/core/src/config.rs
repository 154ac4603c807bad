use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::balancer::{BalancerError, ContentBalancer, SkillQuota, default_quotas};
use crate::irt::IrtModel;
use crate::stopping::StoppingRule;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("min items must be > 0")]
    InvalidMinItems,

    #[error("max items ({max}) must be >= min items ({min})")]
    InvalidItemBounds { min: u32, max: u32 },

    #[error("standard error threshold must be finite and > 0, got {0}")]
    InvalidSeThreshold(f64),

    #[error("scan window must be > 0")]
    InvalidScanWindow,

    #[error("jitter must be finite and >= 0, got {0}")]
    InvalidJitter(f64),

    #[error("skill quotas sum to {total}, expected max items ({max})")]
    QuotaMismatch { total: u32, max: u32 },

    #[error(transparent)]
    Quotas(#[from] BalancerError),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

//
// ─── ENGINE CONFIG ─────────────────────────────────────────────────────────────
//

/// Tunables for one placement engine instance.
///
/// Validated on construction and on load, so a held `EngineConfig` always has
/// quotas that add up to the hard item cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEngineConfig", into = "RawEngineConfig")]
pub struct EngineConfig {
    min_items: u32,
    max_items: u32,
    se_threshold: f64,
    scan_window: u32,
    jitter: f64,
    quotas: Vec<SkillQuota>,
}

impl EngineConfig {
    pub const DEFAULT_MIN_ITEMS: u32 = 20;
    pub const DEFAULT_MAX_ITEMS: u32 = 40;
    pub const DEFAULT_SE_THRESHOLD: f64 = 0.30;
    pub const DEFAULT_SCAN_WINDOW: u32 = 50;
    pub const DEFAULT_JITTER: f64 = 0.1;

    /// Build a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any bound is invalid or the quotas do not sum
    /// to `max_items`.
    pub fn new(
        min_items: u32,
        max_items: u32,
        se_threshold: f64,
        scan_window: u32,
        jitter: f64,
        quotas: Vec<SkillQuota>,
    ) -> Result<Self, ConfigError> {
        if min_items == 0 {
            return Err(ConfigError::InvalidMinItems);
        }
        if max_items < min_items {
            return Err(ConfigError::InvalidItemBounds {
                min: min_items,
                max: max_items,
            });
        }
        if !se_threshold.is_finite() || se_threshold <= 0.0 {
            return Err(ConfigError::InvalidSeThreshold(se_threshold));
        }
        if scan_window == 0 {
            return Err(ConfigError::InvalidScanWindow);
        }
        if !jitter.is_finite() || jitter < 0.0 {
            return Err(ConfigError::InvalidJitter(jitter));
        }
        let balancer = ContentBalancer::new(quotas)?;
        if balancer.total() != max_items {
            return Err(ConfigError::QuotaMismatch {
                total: balancer.total(),
                max: max_items,
            });
        }

        Ok(Self {
            min_items,
            max_items,
            se_threshold,
            scan_window,
            jitter,
            quotas: balancer.quotas().to_vec(),
        })
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io`, `ConfigError::Parse`, or any validation error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        debug!(
            path = %path.display(),
            min_items = config.min_items,
            max_items = config.max_items,
            se_threshold = config.se_threshold,
            "loaded engine config"
        );
        Ok(config)
    }

    /// Parse and validate a TOML document; missing keys take the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` or any validation error.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawEngineConfig = toml::from_str(toml_str)?;
        Self::try_from(raw)
    }

    #[must_use]
    pub fn min_items(&self) -> u32 {
        self.min_items
    }

    #[must_use]
    pub fn max_items(&self) -> u32 {
        self.max_items
    }

    #[must_use]
    pub fn se_threshold(&self) -> f64 {
        self.se_threshold
    }

    /// Candidates scanned per skill when choosing an item.
    #[must_use]
    pub fn scan_window(&self) -> u32 {
        self.scan_window
    }

    /// Upper bound of the uniform tie-break jitter.
    #[must_use]
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    #[must_use]
    pub fn quotas(&self) -> &[SkillQuota] {
        &self.quotas
    }

    #[must_use]
    pub fn balancer(&self) -> ContentBalancer {
        // Quotas were validated in `new`.
        ContentBalancer::new(self.quotas.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn stopping_rule(&self, model: IrtModel) -> StoppingRule {
        StoppingRule::new(
            model,
            self.min_items as usize,
            self.max_items as usize,
            self.se_threshold,
        )
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_items: Self::DEFAULT_MIN_ITEMS,
            max_items: Self::DEFAULT_MAX_ITEMS,
            se_threshold: Self::DEFAULT_SE_THRESHOLD,
            scan_window: Self::DEFAULT_SCAN_WINDOW,
            jitter: Self::DEFAULT_JITTER,
            quotas: default_quotas(),
        }
    }
}

//
// ─── FILE SHAPE ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEngineConfig {
    #[serde(default = "default_min_items")]
    min_items: u32,
    #[serde(default = "default_max_items")]
    max_items: u32,
    #[serde(default = "default_se_threshold")]
    se_threshold: f64,
    #[serde(default = "default_scan_window")]
    scan_window: u32,
    #[serde(default = "default_jitter")]
    jitter: f64,
    #[serde(default = "default_quotas")]
    quotas: Vec<SkillQuota>,
}

fn default_min_items() -> u32 {
    EngineConfig::DEFAULT_MIN_ITEMS
}

fn default_max_items() -> u32 {
    EngineConfig::DEFAULT_MAX_ITEMS
}

fn default_se_threshold() -> f64 {
    EngineConfig::DEFAULT_SE_THRESHOLD
}

fn default_scan_window() -> u32 {
    EngineConfig::DEFAULT_SCAN_WINDOW
}

fn default_jitter() -> f64 {
    EngineConfig::DEFAULT_JITTER
}

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = ConfigError;

    fn try_from(raw: RawEngineConfig) -> Result<Self, Self::Error> {
        EngineConfig::new(
            raw.min_items,
            raw.max_items,
            raw.se_threshold,
            raw.scan_window,
            raw.jitter,
            raw.quotas,
        )
    }
}

impl From<EngineConfig> for RawEngineConfig {
    fn from(config: EngineConfig) -> Self {
        Self {
            min_items: config.min_items,
            max_items: config.max_items,
            se_threshold: config.se_threshold,
            scan_window: config.scan_window,
            jitter: config.jitter,
            quotas: config.quotas,
        }
    }
}
