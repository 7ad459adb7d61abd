//! Allocation decisions, the unit stored in the allocation cache.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::experiment::VariantSnapshot;
use super::ids::{ExperimentId, VariantId, VisitorId};

/// Cache key for an allocation: one entry per (experiment, visitor) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationKey {
    pub experiment_id: ExperimentId,
    pub visitor_id: VisitorId,
}

impl AllocationKey {
    pub fn new(experiment_id: ExperimentId, visitor_id: VisitorId) -> Self {
        Self {
            experiment_id,
            visitor_id,
        }
    }

    /// Stable content hash of the key, usable as a filesystem-safe name.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.to_string().as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for AllocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "allocation:{}:{}", self.experiment_id, self.visitor_id)
    }
}

/// The variant a visitor was bucketed into.
///
/// Created once per (experiment, visitor) and never mutated afterwards.
/// `is_new_allocation` is true only on the call that computed the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub experiment_id: ExperimentId,
    pub visitor_id: VisitorId,
    pub variant_id: VariantId,
    pub variant: VariantSnapshot,
    pub is_new_allocation: bool,
}

impl Allocation {
    pub fn key(&self) -> AllocationKey {
        AllocationKey::new(self.experiment_id.clone(), self.visitor_id.clone())
    }

    /// Copy of this allocation as it is returned on a cache hit.
    pub fn as_cached(&self) -> Self {
        Self {
            is_new_allocation: false,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Allocation {
        Allocation {
            experiment_id: ExperimentId::from("exp-1"),
            visitor_id: VisitorId::from("visitor/with:odd chars"),
            variant_id: VariantId::from("b"),
            variant: VariantSnapshot {
                id: VariantId::from("b"),
                name: "B".into(),
                is_control: false,
                traffic_percentage: 50.0,
            },
            is_new_allocation: true,
        }
    }

    #[test]
    fn key_display_format() {
        let key = sample().key();
        assert_eq!(key.to_string(), "allocation:exp-1:visitor/with:odd chars");
    }

    #[test]
    fn digest_is_hex_and_stable() {
        let key = sample().key();
        let d1 = key.digest();
        let d2 = key.digest();
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert!(d1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cached_copy_clears_new_flag() {
        let alloc = sample();
        let cached = alloc.as_cached();
        assert!(!cached.is_new_allocation);
        assert_eq!(cached.variant_id, alloc.variant_id);
    }
}
