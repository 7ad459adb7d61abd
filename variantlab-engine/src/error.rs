//! Error types shared by gateways and services.

use thiserror::Error;
use variantlab_core::domain::{ExperimentId, VariantId};

/// Failures raised by repository and cache gateways.
///
/// The allocation and conversion paths swallow these (logging them) so a
/// storage outage never breaks the caller's request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("experiment '{0}' not found")]
    ExperimentNotFound(ExperimentId),

    #[error("variant '{0}' not found")]
    VariantNotFound(VariantId),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}
