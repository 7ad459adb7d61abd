//! VariantLab Core: experiment domain types, deterministic bucketing, traffic
//! allocation and conversion statistics.
//!
//! Everything in this crate is pure:
//! - Domain types (experiments, variants, allocations, ids)
//! - Hash bucketer mapping (experiment, visitor) into [0, 10000)
//! - Traffic allocator walking cumulative percentage ranges
//! - Confidence intervals, two-proportion z-test, lift and sample sizing
//!
//! Storage, caching and orchestration live in `variantlab-engine`.

pub mod bucket;
pub mod domain;
pub mod stats;
pub mod traffic;

pub use bucket::{bucket_for, BUCKET_COUNT};
pub use traffic::{inspect_split, select_variant, SplitReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: all core types are Send + Sync so the engine can
    /// share them across request threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Experiment>();
        require_sync::<domain::Experiment>();
        require_send::<domain::Variant>();
        require_sync::<domain::Variant>();
        require_send::<domain::Allocation>();
        require_sync::<domain::Allocation>();
        require_send::<domain::AllocationKey>();
        require_sync::<domain::AllocationKey>();

        require_send::<stats::ConfidenceLevel>();
        require_sync::<stats::ConfidenceLevel>();
        require_send::<stats::SignificanceTest>();
        require_sync::<stats::SignificanceTest>();
        require_send::<stats::SignificanceResult>();
        require_sync::<stats::SignificanceResult>();
        require_send::<stats::ConfidenceInterval>();
        require_sync::<stats::ConfidenceInterval>();

        require_send::<SplitReport>();
        require_sync::<SplitReport>();
    }

    /// Bucketing and traffic allocation compose into a full assignment
    /// without any I/O.
    #[test]
    fn bucket_then_select_is_pure() {
        let variants = vec![
            domain::Variant::control("a", "A", 50.0),
            domain::Variant::new("b", "B", 50.0),
        ];
        let exp = domain::ExperimentId::from("exp-pure");
        let visitor = domain::VisitorId::from("visitor-7");

        let first = select_variant(&variants, bucket_for(&exp, &visitor)).map(|v| v.id.clone());
        let second = select_variant(&variants, bucket_for(&exp, &visitor)).map(|v| v.id.clone());
        assert!(first.is_some());
        assert_eq!(first, second);
    }
}
