//! Allocation service: which variant does this visitor see?
//!
//! Flow per call:
//! 1. Cache hit → return the cached decision as-is (`is_new_allocation =
//!    false`) without consulting the repository. Sticky across later
//!    lifecycle changes of the experiment.
//! 2. Cache miss → load the experiment; absent or not accepting new visitors
//!    (not `Running`, or past `ended_at`) → `None`.
//! 3. Bucket the visitor, pick the variant whose range covers the bucket.
//! 4. Increment that variant's visitors, cache the decision, return it.
//!
//! Gateway failures are logged and turned into `None`; allocation must never
//! break the caller's page render.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use variantlab_core::domain::{Allocation, AllocationKey, ExperimentId, VisitorId};
use variantlab_core::{bucket_for, select_variant};

use crate::error::GatewayError;
use crate::gateway::{AllocationCache, ExperimentRepository};

/// Assigns visitors to experiment variants with sticky, deterministic
/// bucketing.
#[derive(Clone)]
pub struct AllocationService {
    repository: Arc<dyn ExperimentRepository>,
    cache: Arc<dyn AllocationCache>,
}

impl AllocationService {
    pub fn new(repository: Arc<dyn ExperimentRepository>, cache: Arc<dyn AllocationCache>) -> Self {
        Self { repository, cache }
    }

    /// Allocate at the current wall-clock time.
    pub fn allocate(&self, experiment_id: &ExperimentId, visitor_id: &VisitorId) -> Option<Allocation> {
        self.allocate_at(experiment_id, visitor_id, Utc::now())
    }

    /// Allocate as of `now` (eligibility compares `ended_at` against it).
    pub fn allocate_at(
        &self,
        experiment_id: &ExperimentId,
        visitor_id: &VisitorId,
        now: DateTime<Utc>,
    ) -> Option<Allocation> {
        match self.try_allocate(experiment_id, visitor_id, now) {
            Ok(allocation) => allocation,
            Err(err) => {
                warn!(
                    experiment_id = %experiment_id,
                    visitor_id = %visitor_id,
                    error = %err,
                    "allocation failed; serving no variant"
                );
                None
            }
        }
    }

    fn try_allocate(
        &self,
        experiment_id: &ExperimentId,
        visitor_id: &VisitorId,
        now: DateTime<Utc>,
    ) -> Result<Option<Allocation>, GatewayError> {
        let key = AllocationKey::new(experiment_id.clone(), visitor_id.clone());

        if let Some(cached) = self.cache.get(&key)? {
            return Ok(Some(cached.as_cached()));
        }

        let Some(experiment) = self.repository.get_experiment(experiment_id)? else {
            debug!(experiment_id = %experiment_id, "experiment not found");
            return Ok(None);
        };

        if !experiment.accepts_new_visitors(now) {
            debug!(
                experiment_id = %experiment_id,
                status = ?experiment.status,
                ended_at = ?experiment.ended_at,
                "experiment not accepting new visitors"
            );
            return Ok(None);
        }

        let bucket = bucket_for(experiment_id, visitor_id);
        let Some(variant) = select_variant(&experiment.variants, bucket) else {
            debug!(
                experiment_id = %experiment_id,
                bucket,
                "bucket not covered by any variant range"
            );
            return Ok(None);
        };

        self.repository
            .increment_variant_visitors(experiment_id, &variant.id)?;

        let allocation = Allocation {
            experiment_id: experiment_id.clone(),
            visitor_id: visitor_id.clone(),
            variant_id: variant.id.clone(),
            variant: variant.snapshot(),
            is_new_allocation: true,
        };
        self.cache.set(&key, &allocation)?;

        debug!(
            experiment_id = %experiment_id,
            visitor_id = %visitor_id,
            variant_id = %allocation.variant_id,
            bucket,
            "new allocation"
        );
        Ok(Some(allocation))
    }
}
