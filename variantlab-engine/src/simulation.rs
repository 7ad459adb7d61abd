//! Synthetic traffic simulator.
//!
//! Drives a real [`ExperimentEngine`] with `N` visitors in parallel. Each
//! visitor's conversion draw comes from its own `StdRng`, seeded by BLAKE3 over
//! `(seed, experiment, visitor)`, so outcomes do not depend on thread count or
//! scheduling order. Only floating-point revenue sums may differ in the last
//! bits between runs.
//!
//! Fixture format:
//!
//! ```toml
//! [experiment]
//! id = "checkout-button"
//! name = "Checkout button colour"
//! status = "RUNNING"
//!
//! [[experiment.variants]]
//! id = "blue"
//! name = "Blue"
//! is_control = true
//! traffic_percentage = 50.0
//!
//! [[experiment.variants]]
//! id = "green"
//! name = "Green"
//! traffic_percentage = 50.0
//!
//! [truth.blue]
//! conversion_rate = 0.05
//! average_order_value = 40.0
//!
//! [truth.green]
//! conversion_rate = 0.06
//! average_order_value = 40.0
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use variantlab_core::domain::{Experiment, ExperimentId, VariantId, VisitorId};

use crate::config::EngineConfig;
use crate::engine::ExperimentEngine;
use crate::error::GatewayError;
use crate::gateway::{InMemoryAllocationCache, InMemoryRepository};
use crate::results::ExperimentResults;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("failed to read fixture {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse fixture: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no true conversion rate given for variant '{0}'")]
    MissingTruth(VariantId),
    #[error("true conversion rate for variant '{variant}' must be in [0, 1], got {rate}")]
    InvalidRate { variant: VariantId, rate: f64 },
    #[error("experiment '{0}' is not accepting visitors")]
    NotAcceptingVisitors(ExperimentId),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Ground truth for one variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrueRates {
    /// Probability (fraction) that an allocated visitor converts.
    pub conversion_rate: f64,
    /// Mean revenue per conversion; 0 records no revenue.
    #[serde(default)]
    pub average_order_value: f64,
}

/// An experiment plus the true behaviour of each variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentFixture {
    pub experiment: Experiment,
    /// Keyed by variant id.
    pub truth: BTreeMap<String, TrueRates>,
}

impl ExperimentFixture {
    pub fn from_toml(content: &str) -> Result<Self, SimulationError> {
        let fixture: Self = toml::from_str(content)?;
        fixture.validate()?;
        Ok(fixture)
    }

    pub fn from_file(path: &Path) -> Result<Self, SimulationError> {
        let content = std::fs::read_to_string(path).map_err(|source| SimulationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), SimulationError> {
        for variant in &self.experiment.variants {
            let truth = self.truth_for(&variant.id)?;
            if !(0.0..=1.0).contains(&truth.conversion_rate) {
                return Err(SimulationError::InvalidRate {
                    variant: variant.id.clone(),
                    rate: truth.conversion_rate,
                });
            }
        }
        Ok(())
    }

    fn truth_for(&self, variant_id: &VariantId) -> Result<TrueRates, SimulationError> {
        self.truth
            .get(variant_id.as_str())
            .copied()
            .ok_or_else(|| SimulationError::MissingTruth(variant_id.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub visitors: u64,
    pub seed: u64,
    /// Worker threads; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    pub visitor_prefix: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            visitors: 10_000,
            seed: 42,
            threads: None,
            visitor_prefix: "visitor-".into(),
        }
    }
}

/// Outcome of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub visitors: u64,
    pub allocated: u64,
    /// Visitors whose bucket fell outside every variant range.
    pub unallocated: u64,
    pub conversions: u64,
    pub results: ExperimentResults,
}

/// Deterministic per-visitor seed.
pub fn visitor_seed(seed: u64, experiment_id: &ExperimentId, visitor_id: &VisitorId) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(experiment_id.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(visitor_id.as_str().as_bytes());
    let hash = hasher.finalize();
    let mut first = [0u8; 8];
    first.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(first)
}

/// Run a fresh in-memory engine over the fixture.
pub fn simulate(
    fixture: &ExperimentFixture,
    config: &SimulationConfig,
    engine_config: EngineConfig,
    now: DateTime<Utc>,
) -> Result<SimulationReport, SimulationError> {
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert(fixture.experiment.clone());
    let engine = ExperimentEngine::new(repo, Arc::new(InMemoryAllocationCache::new()), engine_config);
    run_simulation(&engine, fixture, config, now)
}

/// Send `config.visitors` synthetic visitors through `engine`.
///
/// The engine's repository must already hold `fixture.experiment`.
pub fn run_simulation(
    engine: &ExperimentEngine,
    fixture: &ExperimentFixture,
    config: &SimulationConfig,
    now: DateTime<Utc>,
) -> Result<SimulationReport, SimulationError> {
    let experiment_id = &fixture.experiment.id;
    if !fixture.experiment.accepts_new_visitors(now) {
        return Err(SimulationError::NotAcceptingVisitors(experiment_id.clone()));
    }
    fixture.validate()?;

    let allocated = AtomicU64::new(0);
    let conversions = AtomicU64::new(0);

    let visit = |i: u64| {
        let visitor_id = VisitorId::new(format!("{}{i}", config.visitor_prefix));
        let Some(allocation) = engine.allocate_variant_at(experiment_id, &visitor_id, now) else {
            return;
        };
        allocated.fetch_add(1, Ordering::Relaxed);

        let Ok(truth) = fixture.truth_for(&allocation.variant_id) else {
            return;
        };
        let mut rng = StdRng::seed_from_u64(visitor_seed(config.seed, experiment_id, &visitor_id));
        if rng.gen::<f64>() < truth.conversion_rate {
            let revenue = (truth.average_order_value > 0.0)
                .then(|| truth.average_order_value * rng.gen_range(0.5..1.5));
            engine.record_conversion(experiment_id, &allocation.variant_id, &visitor_id, revenue);
            conversions.fetch_add(1, Ordering::Relaxed);
        }
    };

    match config.threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            pool.install(|| (0..config.visitors).into_par_iter().for_each(visit));
        }
        None => (0..config.visitors).into_par_iter().for_each(visit),
    }

    let results = engine
        .get_experiment_results(experiment_id)?
        .ok_or_else(|| GatewayError::ExperimentNotFound(experiment_id.clone()))?;

    let allocated = allocated.into_inner();
    let report = SimulationReport {
        visitors: config.visitors,
        allocated,
        unallocated: config.visitors - allocated,
        conversions: conversions.into_inner(),
        results,
    };
    info!(
        experiment_id = %experiment_id,
        visitors = report.visitors,
        allocated = report.allocated,
        conversions = report.conversions,
        "simulation finished"
    );
    Ok(report)
}
