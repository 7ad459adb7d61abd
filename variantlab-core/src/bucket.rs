//! Deterministic visitor bucketing.
//!
//! A `(experiment_id, visitor_id)` pair is hashed with BLAKE3 into a bucket in
//! `[0, BUCKET_COUNT)`. Derivation depends only on the two ids, never on call
//! order, thread scheduling, wall-clock time or process state, so the same pair
//! lands in the same bucket across processes and restarts.

use crate::domain::{ExperimentId, VisitorId};

/// Number of buckets. One percent of traffic covers 100 buckets.
pub const BUCKET_COUNT: u32 = 10_000;

/// Bucket width units per traffic percentage point.
pub const BUCKETS_PER_PERCENT: f64 = BUCKET_COUNT as f64 / 100.0;

/// Map a visitor to a stable bucket in `[0, BUCKET_COUNT)`.
///
/// Ids are length-prefixed before hashing so `("ab", "c")` and `("a", "bc")`
/// hash differently.
pub fn bucket_for(experiment_id: &ExperimentId, visitor_id: &VisitorId) -> u32 {
    let digest = bucket_digest(experiment_id.as_str(), visitor_id.as_str());
    (digest % u64::from(BUCKET_COUNT)) as u32
}

fn bucket_digest(experiment_id: &str, visitor_id: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(experiment_id.len() as u64).to_le_bytes());
    hasher.update(experiment_id.as_bytes());
    hasher.update(&(visitor_id.len() as u64).to_le_bytes());
    hasher.update(visitor_id.as_bytes());
    let hash = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(head)
}
