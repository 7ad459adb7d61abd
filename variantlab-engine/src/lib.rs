//! VariantLab engine: services and gateways on top of `variantlab-core`.
//!
//! This crate provides:
//! - Gateway traits for the experiment store and allocation cache, with
//!   in-memory and JSON-file reference backends
//! - Allocation service (sticky, status-gated bucketing)
//! - Conversion recorder
//! - Results compiler with winner detection and recommendations
//! - [`ExperimentEngine`] facade, TOML configuration, export and simulation

pub mod allocation;
pub mod config;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod export;
pub mod gateway;
pub mod results;
pub mod simulation;

pub use allocation::AllocationService;
pub use config::{CacheBackend, CacheConfig, ConfigError, EngineConfig, StatisticsConfig};
pub use conversion::ConversionRecorder;
pub use engine::ExperimentEngine;
pub use error::GatewayError;
pub use export::{export_json, export_variants_csv, import_json, save_results, ExportError};
pub use gateway::{
    AllocationCache, ExperimentRepository, InMemoryAllocationCache, InMemoryRepository,
    JsonFileAllocationCache,
};
pub use results::{
    compile_results, ExperimentResults, Recommendation, ResultsCompiler, VariantResult, Winner,
};
pub use simulation::{
    run_simulation, simulate, ExperimentFixture, SimulationConfig, SimulationError,
    SimulationReport, TrueRates,
};
