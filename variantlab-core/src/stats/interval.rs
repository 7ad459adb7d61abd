//! Wald confidence interval for a single conversion proportion.

use serde::{Deserialize, Serialize};

use super::ConfidenceLevel;

/// Interval bounds in percent, both within [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value_pct: f64) -> bool {
        value_pct >= self.lower && value_pct <= self.upper
    }
}

/// Normal-approximation interval `p ± z * sqrt(p(1-p)/n)` expressed in percent.
///
/// Zero visitors yields `{0, 0}`. Bounds are clamped to [0, 100].
pub fn confidence_interval(
    conversions: u64,
    visitors: u64,
    level: ConfidenceLevel,
) -> ConfidenceInterval {
    if visitors == 0 {
        return ConfidenceInterval::default();
    }

    let n = visitors as f64;
    let p = (conversions as f64 / n).min(1.0);
    let margin = level.z_critical() * (p * (1.0 - p) / n).sqrt();

    ConfidenceInterval {
        lower: ((p - margin) * 100.0).max(0.0),
        upper: ((p + margin) * 100.0).min(100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ci95(conversions: u64, visitors: u64) -> ConfidenceInterval {
        confidence_interval(conversions, visitors, ConfidenceLevel::default())
    }

    #[test]
    fn zero_visitors_is_zero_interval() {
        let ci = ci95(0, 0);
        assert_eq!(ci.lower, 0.0);
        assert_eq!(ci.upper, 0.0);
    }

    #[test]
    fn all_converted_is_capped_at_one_hundred() {
        let ci = ci95(100, 100);
        assert!(ci.upper <= 100.0);
        assert!(ci.lower <= ci.upper);
    }

    #[test]
    fn textbook_interval() {
        // p = 0.05, n = 1000: margin = 1.96 * sqrt(0.0475 / 1000) ≈ 0.01351
        let ci = ci95(50, 1000);
        assert!((ci.lower - 3.649).abs() < 0.01, "lower {}", ci.lower);
        assert!((ci.upper - 6.351).abs() < 0.01, "upper {}", ci.upper);
        assert!(ci.contains(5.0));
    }

    #[test]
    fn low_rate_lower_bound_is_clamped() {
        let ci = ci95(1, 20);
        assert_eq!(ci.lower, 0.0);
        assert!(ci.upper > 5.0);
    }

    #[test]
    fn wider_at_higher_confidence() {
        let ci90 = confidence_interval(30, 400, ConfidenceLevel::new(0.90).unwrap());
        let ci99 = confidence_interval(30, 400, ConfidenceLevel::new(0.99).unwrap());
        assert!(ci99.width() > ci90.width());
    }

    #[test]
    fn narrower_with_more_visitors() {
        assert!(ci95(500, 10_000).width() < ci95(50, 1_000).width());
    }
}
