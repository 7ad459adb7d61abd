//! Conversion recording.
//!
//! The caller is trusted to pass the variant it was allocated; no
//! re-validation against the allocation cache is done. There is no
//! idempotency key, so a replayed event counts twice.

use std::sync::Arc;

use tracing::{debug, warn};

use variantlab_core::domain::{ExperimentId, VariantId, VisitorId};

use crate::error::GatewayError;
use crate::gateway::ExperimentRepository;

/// Records conversions and keeps the stored conversion rate current.
#[derive(Clone)]
pub struct ConversionRecorder {
    repository: Arc<dyn ExperimentRepository>,
}

impl ConversionRecorder {
    pub fn new(repository: Arc<dyn ExperimentRepository>) -> Self {
        Self { repository }
    }

    /// Count one conversion (plus optional revenue) for a variant.
    ///
    /// Never fails from the caller's point of view: gateway errors are logged.
    /// Negative or non-finite revenue is dropped; the conversion still counts.
    pub fn record_conversion(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
        visitor_id: &VisitorId,
        revenue: Option<f64>,
    ) {
        let revenue = revenue.filter(|amount| {
            let valid = amount.is_finite() && *amount >= 0.0;
            if !valid {
                warn!(
                    experiment_id = %experiment_id,
                    variant_id = %variant_id,
                    revenue = *amount,
                    "ignoring invalid revenue amount"
                );
            }
            valid
        });

        if let Err(err) = self.try_record(experiment_id, variant_id, revenue) {
            warn!(
                experiment_id = %experiment_id,
                variant_id = %variant_id,
                visitor_id = %visitor_id,
                error = %err,
                "failed to record conversion"
            );
        }
    }

    fn try_record(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
        revenue: Option<f64>,
    ) -> Result<(), GatewayError> {
        let counters = self
            .repository
            .increment_variant_conversions(experiment_id, variant_id, revenue)?;
        let rate = counters.conversion_rate();
        self.repository
            .update_variant_conversion_rate(experiment_id, variant_id, rate)?;

        debug!(
            experiment_id = %experiment_id,
            variant_id = %variant_id,
            conversions = counters.conversions,
            visitors = counters.visitors,
            rate,
            "conversion recorded"
        );
        Ok(())
    }
}
