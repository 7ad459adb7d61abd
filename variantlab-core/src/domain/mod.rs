//! Domain types for VariantLab

pub mod allocation;
pub mod experiment;
pub mod ids;

pub use allocation::{Allocation, AllocationKey};
pub use experiment::{
    Experiment, ExperimentStatus, Variant, VariantCounters, VariantSnapshot,
    DEFAULT_CONFIDENCE_LEVEL,
};
pub use ids::{ExperimentId, VariantId, VisitorId};
