//! Storage seams: the experiment repository and the allocation cache.
//!
//! Production deployments back these with a relational store and a key-value
//! cache. Two reference backends ship here:
//! - [`memory`]: `DashMap`-backed repository and cache
//! - [`file_cache`]: one JSON file per allocation, survives restarts

pub mod file_cache;
pub mod memory;

use variantlab_core::domain::{
    Allocation, AllocationKey, Experiment, ExperimentId, VariantCounters, VariantId,
};

use crate::error::GatewayError;

pub use file_cache::JsonFileAllocationCache;
pub use memory::{InMemoryAllocationCache, InMemoryRepository};

/// Read access to experiments and atomic writes to variant counters.
///
/// Variant ids are only unique within their experiment, so every write is
/// addressed by the `(experiment, variant)` pair.
///
/// Increments must be atomic at the backend (a single `counter = counter + 1`
/// statement, or an equivalent per-record lock), never a read-modify-write
/// of the whole record from the caller, so concurrent increments of the same
/// variant do not lose updates.
pub trait ExperimentRepository: Send + Sync {
    /// Experiment with its variants in stored order, or `None` if absent.
    fn get_experiment(&self, id: &ExperimentId) -> Result<Option<Experiment>, GatewayError>;

    /// `visitors += 1` for one variant.
    fn increment_variant_visitors(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
    ) -> Result<(), GatewayError>;

    /// `conversions += 1` and `revenue += amount` when given. Returns the
    /// counters as they stand after the increment.
    fn increment_variant_conversions(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
        revenue: Option<f64>,
    ) -> Result<VariantCounters, GatewayError>;

    /// Persist the denormalized conversion rate (fraction).
    fn update_variant_conversion_rate(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
        rate: f64,
    ) -> Result<(), GatewayError>;
}

/// Sticky storage of allocation decisions keyed by (experiment, visitor).
///
/// No expiry is imposed; entries live as long as the backend keeps them.
pub trait AllocationCache: Send + Sync {
    fn get(&self, key: &AllocationKey) -> Result<Option<Allocation>, GatewayError>;

    fn set(&self, key: &AllocationKey, allocation: &Allocation) -> Result<(), GatewayError>;
}
