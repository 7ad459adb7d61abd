//! Experiment engine: the one object an API layer talks to.
//!
//! Constructed explicitly from gateways (or from [`EngineConfig`]) and shared
//! through `Arc`/`Clone`. There is no process-wide instance.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use variantlab_core::domain::{Allocation, ExperimentId, VariantId, VisitorId};
use variantlab_core::stats::{
    confidence_interval, required_sample_size, ConfidenceInterval, ConfidenceLevel,
    SampleCounts, SignificanceResult, StatsError,
};

use crate::allocation::AllocationService;
use crate::config::{CacheBackend, EngineConfig};
use crate::conversion::ConversionRecorder;
use crate::error::GatewayError;
use crate::gateway::{
    AllocationCache, ExperimentRepository, InMemoryAllocationCache, JsonFileAllocationCache,
};
use crate::results::{ExperimentResults, ResultsCompiler};

/// Facade over allocation, conversion recording, statistics and results.
#[derive(Clone)]
pub struct ExperimentEngine {
    allocation: AllocationService,
    conversions: ConversionRecorder,
    results: ResultsCompiler,
    config: EngineConfig,
}

impl ExperimentEngine {
    pub fn new(
        repository: Arc<dyn ExperimentRepository>,
        cache: Arc<dyn AllocationCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            allocation: AllocationService::new(repository.clone(), cache),
            conversions: ConversionRecorder::new(repository.clone()),
            results: ResultsCompiler::new(repository, config.statistics.clone()),
            config,
        }
    }

    /// Build with the cache backend named in `config.cache`.
    pub fn from_config(
        repository: Arc<dyn ExperimentRepository>,
        config: EngineConfig,
    ) -> Result<Self, GatewayError> {
        let cache: Arc<dyn AllocationCache> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(InMemoryAllocationCache::new()),
            CacheBackend::File => Arc::new(JsonFileAllocationCache::new(&config.cache.dir)?),
        };
        Ok(Self::new(repository, cache, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn allocate_variant(
        &self,
        experiment_id: &ExperimentId,
        visitor_id: &VisitorId,
    ) -> Option<Allocation> {
        self.allocation.allocate(experiment_id, visitor_id)
    }

    /// [`Self::allocate_variant`] with an explicit clock.
    pub fn allocate_variant_at(
        &self,
        experiment_id: &ExperimentId,
        visitor_id: &VisitorId,
        now: DateTime<Utc>,
    ) -> Option<Allocation> {
        self.allocation.allocate_at(experiment_id, visitor_id, now)
    }

    pub fn record_conversion(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
        visitor_id: &VisitorId,
        revenue: Option<f64>,
    ) {
        self.conversions
            .record_conversion(experiment_id, variant_id, visitor_id, revenue);
    }

    /// Pooled z-test of `test` against `control`, using the configured
    /// sample floor.
    pub fn calculate_statistical_significance(
        &self,
        control: SampleCounts,
        test: SampleCounts,
        level: ConfidenceLevel,
    ) -> SignificanceResult {
        self.config
            .statistics
            .significance_test(level)
            .compare(&control, &test)
    }

    pub fn calculate_confidence_interval(
        &self,
        conversions: u64,
        visitors: u64,
        level: ConfidenceLevel,
    ) -> ConfidenceInterval {
        confidence_interval(conversions, visitors, level)
    }

    pub fn get_experiment_results(
        &self,
        experiment_id: &ExperimentId,
    ) -> Result<Option<ExperimentResults>, GatewayError> {
        self.results.get_experiment_results(experiment_id)
    }

    /// Visitors per variant to detect `relative_mde` over `baseline_rate`
    /// at the configured power.
    pub fn required_sample_size(
        &self,
        baseline_rate: f64,
        relative_mde: f64,
        level: ConfidenceLevel,
    ) -> Result<u64, StatsError> {
        required_sample_size(
            baseline_rate,
            relative_mde,
            level,
            self.config.statistics.power,
        )
    }
}
