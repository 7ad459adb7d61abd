//! Traffic allocation: bucket → variant by cumulative percentage ranges.
//!
//! Variants are walked in stored order. Each covers
//! `traffic_percentage * BUCKETS_PER_PERCENT` buckets; the first variant whose
//! cumulative upper bound exceeds the bucket is selected. Percentages are not
//! validated here: a split summing below 100 leaves the tail buckets
//! unallocated, and a split above 100 leaves later variants unreachable.

use serde::{Deserialize, Serialize};

use crate::bucket::{BUCKETS_PER_PERCENT, BUCKET_COUNT};
use crate::domain::Variant;

/// Select the variant owning `bucket`, or `None` if no range covers it.
pub fn select_variant(variants: &[Variant], bucket: u32) -> Option<&Variant> {
    let bucket = f64::from(bucket);
    let mut upper = 0.0;
    for variant in variants {
        upper += variant.traffic_percentage * BUCKETS_PER_PERCENT;
        if bucket < upper {
            return Some(variant);
        }
    }
    None
}

/// Diagnostic view of a traffic split. Reported, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitReport {
    /// Sum of all traffic percentages.
    pub total_percentage: f64,
    /// Buckets reached by no variant (split below 100).
    pub unallocated_buckets: u32,
    /// Percentage points past 100 that can never be reached.
    pub overflow_percentage: f64,
    pub control_count: usize,
}

impl SplitReport {
    /// Percentages sum to 100 (within float tolerance) and exactly one control.
    pub fn is_well_formed(&self) -> bool {
        (self.total_percentage - 100.0).abs() < 1e-6 && self.control_count == 1
    }
}

/// Summarize how a variant list covers the bucket space.
pub fn inspect_split(variants: &[Variant]) -> SplitReport {
    let total_percentage: f64 = variants.iter().map(|v| v.traffic_percentage).sum();
    let covered = (total_percentage * BUCKETS_PER_PERCENT).clamp(0.0, f64::from(BUCKET_COUNT));
    let unallocated_buckets = (f64::from(BUCKET_COUNT) - covered).round() as u32;
    let overflow_percentage = (total_percentage - 100.0).max(0.0);

    SplitReport {
        total_percentage,
        unallocated_buckets,
        overflow_percentage,
        control_count: variants.iter().filter(|v| v.is_control).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(percentages: &[f64]) -> Vec<Variant> {
        percentages
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                if i == 0 {
                    Variant::control(format!("v{i}"), format!("V{i}"), p)
                } else {
                    Variant::new(format!("v{i}"), format!("V{i}"), p)
                }
            })
            .collect()
    }

    fn picked(variants: &[Variant], bucket: u32) -> Option<&str> {
        select_variant(variants, bucket).map(|v| v.id.as_str())
    }

    #[test]
    fn fifty_fifty_boundaries() {
        let variants = split(&[50.0, 50.0]);
        assert_eq!(picked(&variants, 0), Some("v0"));
        assert_eq!(picked(&variants, 4_999), Some("v0"));
        assert_eq!(picked(&variants, 5_000), Some("v1"));
        assert_eq!(picked(&variants, 9_999), Some("v1"));
    }

    #[test]
    fn uneven_three_way_split() {
        let variants = split(&[20.0, 30.0, 50.0]);
        assert_eq!(picked(&variants, 1_999), Some("v0"));
        assert_eq!(picked(&variants, 2_000), Some("v1"));
        assert_eq!(picked(&variants, 4_999), Some("v1"));
        assert_eq!(picked(&variants, 5_000), Some("v2"));
    }

    #[test]
    fn fractional_percentages() {
        let variants = split(&[33.33, 33.33, 33.34]);
        assert_eq!(picked(&variants, 3_332), Some("v0"));
        assert_eq!(picked(&variants, 3_334), Some("v1"));
        assert_eq!(picked(&variants, 9_999), Some("v2"));
    }

    #[test]
    fn under_allocated_split_leaves_tail_unassigned() {
        let variants = split(&[40.0, 40.0]);
        assert_eq!(picked(&variants, 7_999), Some("v1"));
        assert_eq!(picked(&variants, 8_000), None);
        assert_eq!(picked(&variants, 9_999), None);
    }

    #[test]
    fn zero_percent_variant_is_never_selected() {
        let variants = split(&[50.0, 0.0, 50.0]);
        for bucket in (0..BUCKET_COUNT).step_by(97) {
            assert_ne!(picked(&variants, bucket), Some("v1"));
        }
    }

    #[test]
    fn empty_variant_list_selects_nothing() {
        assert!(select_variant(&[], 0).is_none());
    }

    #[test]
    fn inspect_reports_gaps_and_overflow() {
        let under = inspect_split(&split(&[40.0, 40.0]));
        assert_eq!(under.unallocated_buckets, 2_000);
        assert_eq!(under.overflow_percentage, 0.0);
        assert!(!under.is_well_formed());

        let over = inspect_split(&split(&[60.0, 60.0]));
        assert_eq!(over.unallocated_buckets, 0);
        assert!((over.overflow_percentage - 20.0).abs() < 1e-9);

        let ok = inspect_split(&split(&[50.0, 50.0]));
        assert!(ok.is_well_formed());
    }

    #[test]
    fn inspect_counts_controls() {
        let mut variants = split(&[50.0, 50.0]);
        variants[1].is_control = true;
        let report = inspect_split(&variants);
        assert_eq!(report.control_count, 2);
        assert!(!report.is_well_formed());
    }
}
