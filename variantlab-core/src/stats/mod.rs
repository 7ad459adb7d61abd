//! Fixed-horizon frequentist statistics for conversion experiments.
//!
//! - Standard normal CDF and quantile ([`normal`])
//! - Wald confidence interval for a single proportion ([`interval`])
//! - Pooled two-proportion z-test with lift ([`significance`])
//! - Required sample size per variant ([`sample_size`])
//!
//! All functions are pure. Rates handed in and out of this module are
//! fractions unless a field name says `_pct`; interval bounds and lift are
//! percentages.

pub mod interval;
pub mod normal;
pub mod sample_size;
pub mod significance;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DEFAULT_CONFIDENCE_LEVEL;

pub use interval::{confidence_interval, ConfidenceInterval};
pub use normal::{normal_cdf, normal_quantile, two_tailed_p_value, P_VALUE_FLOOR};
pub use sample_size::{required_sample_size, DEFAULT_POWER};
pub use significance::{
    SampleCounts, SignificanceResult, SignificanceTest, DEFAULT_MIN_SAMPLE_SIZE,
};

/// Errors from statistics inputs that cannot be given a defined result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("confidence level must be in (0, 1), got {0}")]
    InvalidConfidenceLevel(f64),
    #[error("statistical power must be in (0, 1), got {0}")]
    InvalidPower(f64),
    #[error("baseline rate must be in (0, 1), got {0}")]
    InvalidBaselineRate(f64),
    #[error("minimum detectable effect must be positive and keep the target rate below 1, got {0}")]
    InvalidEffect(f64),
}

/// Two-sided confidence level, validated to lie in the open interval (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceLevel(f64);

impl ConfidenceLevel {
    pub fn new(level: f64) -> Result<Self, StatsError> {
        if level.is_finite() && level > 0.0 && level < 1.0 {
            Ok(Self(level))
        } else {
            Err(StatsError::InvalidConfidenceLevel(level))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Significance threshold α = 1 - level.
    pub fn alpha(self) -> f64 {
        1.0 - self.0
    }

    /// Two-tailed critical value z such that P(|Z| <= z) = level
    /// (1.96 at 95%).
    pub fn z_critical(self) -> f64 {
        normal_quantile(1.0 - self.alpha() / 2.0)
    }
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        Self(DEFAULT_CONFIDENCE_LEVEL)
    }
}

impl TryFrom<f64> for ConfidenceLevel {
    type Error = StatsError;

    fn try_from(level: f64) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<ConfidenceLevel> for f64 {
    fn from(level: ConfidenceLevel) -> Self {
        level.0
    }
}
