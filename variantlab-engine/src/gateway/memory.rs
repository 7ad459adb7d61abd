//! In-memory gateways backed by `DashMap`.
//!
//! Counter increments take the experiment's shard lock for the duration of a
//! single field update, which gives the same no-lost-update guarantee as an
//! atomic `UPDATE ... SET visitors = visitors + 1` in a relational store.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use variantlab_core::domain::{
    Allocation, AllocationKey, Experiment, ExperimentId, ExperimentStatus, Variant,
    VariantCounters, VariantId,
};

use super::{AllocationCache, ExperimentRepository};
use crate::error::GatewayError;

/// Experiment store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    experiments: DashMap<ExperimentId, Experiment>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an experiment.
    pub fn insert(&self, experiment: Experiment) {
        self.experiments.insert(experiment.id.clone(), experiment);
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Lifecycle transition, as performed by the experiment store's owner.
    ///
    /// Entering `Running` stamps `started_at` if unset; entering `Paused` or
    /// `Completed` stamps `ended_at` with `at`.
    pub fn set_status(
        &self,
        id: &ExperimentId,
        status: ExperimentStatus,
        at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let mut entry = self
            .experiments
            .get_mut(id)
            .ok_or_else(|| GatewayError::ExperimentNotFound(id.clone()))?;
        entry.status = status;
        match status {
            ExperimentStatus::Running => {
                entry.started_at.get_or_insert(at);
            }
            ExperimentStatus::Paused | ExperimentStatus::Completed => {
                entry.ended_at = Some(at);
            }
            ExperimentStatus::Draft => {}
        }
        Ok(())
    }

    /// Current copy of one variant. Variant ids are scoped to their
    /// experiment.
    pub fn variant(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
    ) -> Option<Variant> {
        let experiment = self.experiments.get(experiment_id)?;
        experiment.variant(variant_id).cloned()
    }

    fn with_variant_mut<T>(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
        update: impl FnOnce(&mut Variant) -> T,
    ) -> Result<T, GatewayError> {
        let mut experiment = self
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| GatewayError::ExperimentNotFound(experiment_id.clone()))?;
        let variant = experiment
            .variant_mut(variant_id)
            .ok_or_else(|| GatewayError::VariantNotFound(variant_id.clone()))?;

        Ok(update(variant))
    }
}

impl ExperimentRepository for InMemoryRepository {
    fn get_experiment(&self, id: &ExperimentId) -> Result<Option<Experiment>, GatewayError> {
        Ok(self.experiments.get(id).map(|entry| entry.value().clone()))
    }

    fn increment_variant_visitors(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
    ) -> Result<(), GatewayError> {
        self.with_variant_mut(experiment_id, variant_id, |v| v.visitors += 1)
    }

    fn increment_variant_conversions(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
        revenue: Option<f64>,
    ) -> Result<VariantCounters, GatewayError> {
        self.with_variant_mut(experiment_id, variant_id, |v| {
            v.conversions += 1;
            if let Some(amount) = revenue {
                v.revenue += amount;
            }
            v.counters()
        })
    }

    fn update_variant_conversion_rate(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
        rate: f64,
    ) -> Result<(), GatewayError> {
        self.with_variant_mut(experiment_id, variant_id, |v| v.conversion_rate = rate)
    }
}

/// Allocation cache held in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryAllocationCache {
    entries: DashMap<AllocationKey, Allocation>,
}

impl InMemoryAllocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every allocation of one experiment (out-of-band cleanup).
    pub fn evict_experiment(&self, experiment_id: &ExperimentId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| &key.experiment_id != experiment_id);
        before - self.entries.len()
    }
}

impl AllocationCache for InMemoryAllocationCache {
    fn get(&self, key: &AllocationKey) -> Result<Option<Allocation>, GatewayError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &AllocationKey, allocation: &Allocation) -> Result<(), GatewayError> {
        self.entries.insert(key.clone(), allocation.clone());
        Ok(())
    }
}
