//! Pooled two-proportion z-test between a control and a test variant.
//!
//! Underpowered samples (either side below `min_sample_size` visitors) are
//! not tested: they get `p_value = 1` and `is_significant = false`. This is
//! the single interim-analysis policy; there is no sequential correction.

use serde::{Deserialize, Serialize};

use super::normal::two_tailed_p_value;
use super::{ConfidenceInterval, ConfidenceLevel};
use crate::domain::Variant;

/// Minimum visitors per side before a test is run.
pub const DEFAULT_MIN_SAMPLE_SIZE: u64 = 100;

/// Visitor and conversion counts of one side of a comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounts {
    pub visitors: u64,
    pub conversions: u64,
}

impl SampleCounts {
    pub fn new(visitors: u64, conversions: u64) -> Self {
        Self {
            visitors,
            conversions,
        }
    }

    /// Observed proportion (fraction); 0 when there are no visitors.
    pub fn rate(&self) -> f64 {
        if self.visitors == 0 {
            0.0
        } else {
            (self.conversions as f64 / self.visitors as f64).min(1.0)
        }
    }
}

impl From<&Variant> for SampleCounts {
    fn from(variant: &Variant) -> Self {
        Self::new(variant.visitors, variant.conversions)
    }
}

/// Outcome of a two-proportion test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    /// Two-tailed p-value.
    pub p_value: f64,
    pub is_significant: bool,
    /// Relative improvement of test over control, in percent.
    pub lift: f64,
    /// z statistic; 0 when the test was not run.
    pub z_score: f64,
    /// Interval for the absolute rate difference (test - control) in
    /// percentage points, unpooled standard error. Zero-width when the test
    /// was not run.
    pub difference_interval: ConfidenceInterval,
    /// False when the small-sample guard short-circuited the test.
    pub sample_size_sufficient: bool,
}

impl SignificanceResult {
    fn underpowered(lift: f64, sufficient: bool) -> Self {
        Self {
            p_value: 1.0,
            is_significant: false,
            lift,
            z_score: 0.0,
            difference_interval: ConfidenceInterval::default(),
            sample_size_sufficient: sufficient,
        }
    }

    pub fn is_positive_winner(&self) -> bool {
        self.is_significant && self.lift > 0.0
    }

    pub fn is_significant_loss(&self) -> bool {
        self.is_significant && self.lift < 0.0
    }
}

/// Test parameters: confidence level and the small-sample floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceTest {
    pub confidence_level: ConfidenceLevel,
    pub min_sample_size: u64,
}

impl Default for SignificanceTest {
    fn default() -> Self {
        Self {
            confidence_level: ConfidenceLevel::default(),
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
        }
    }
}

impl SignificanceTest {
    pub fn new(confidence_level: ConfidenceLevel, min_sample_size: u64) -> Self {
        Self {
            confidence_level,
            min_sample_size,
        }
    }

    /// Whether a sample clears the small-sample floor.
    pub fn has_sufficient_sample(&self, counts: &SampleCounts) -> bool {
        counts.visitors > 0 && counts.visitors >= self.min_sample_size
    }

    /// Compare `test` against `control`.
    pub fn compare(&self, control: &SampleCounts, test: &SampleCounts) -> SignificanceResult {
        let p1 = control.rate();
        let p2 = test.rate();
        let lift = lift_pct(p1, p2);

        if !self.has_sufficient_sample(control) || !self.has_sufficient_sample(test) {
            return SignificanceResult::underpowered(lift, false);
        }

        let n1 = control.visitors as f64;
        let n2 = test.visitors as f64;
        let pooled = (control.conversions + test.conversions) as f64 / (n1 + n2);
        let std_err = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

        if !std_err.is_finite() || std_err < 1e-15 {
            // No variation on either side (all or nothing converted).
            return SignificanceResult::underpowered(lift, true);
        }

        let z = (p2 - p1) / std_err;
        let p_value = two_tailed_p_value(z);

        let diff = p2 - p1;
        let unpooled_se = (p1 * (1.0 - p1) / n1 + p2 * (1.0 - p2) / n2).sqrt();
        let margin = self.confidence_level.z_critical() * unpooled_se;

        SignificanceResult {
            p_value,
            is_significant: p_value < self.confidence_level.alpha(),
            lift,
            z_score: z,
            difference_interval: ConfidenceInterval {
                lower: (diff - margin) * 100.0,
                upper: (diff + margin) * 100.0,
            },
            sample_size_sufficient: true,
        }
    }
}

/// `(p2 - p1) / p1 * 100`, or 0 when the control rate is 0.
fn lift_pct(p1: f64, p2: f64) -> f64 {
    if p1 > 0.0 {
        (p2 - p1) / p1 * 100.0
    } else {
        0.0
    }
}
