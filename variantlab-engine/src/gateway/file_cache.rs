//! Allocation cache persisted as one JSON file per (experiment, visitor).
//!
//! Layout: `{cache_dir}/{experiment_digest}/{key_digest}.json`, where both
//! digests are BLAKE3 hex so arbitrary visitor ids are filesystem-safe.
//! Writes go to a `.tmp` sibling and are renamed into place, so a concurrent
//! reader never observes a half-written entry.

use std::fs;
use std::path::{Path, PathBuf};

use variantlab_core::domain::{Allocation, AllocationKey, ExperimentId};

use super::AllocationCache;
use crate::error::GatewayError;

/// File-backed allocation cache. Entries survive process restarts.
#[derive(Debug, Clone)]
pub struct JsonFileAllocationCache {
    cache_dir: PathBuf,
}

impl JsonFileAllocationCache {
    /// Creates a cache rooted at `cache_dir`, creating the directory if needed.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Checks whether an allocation is cached for the key.
    pub fn contains(&self, key: &AllocationKey) -> bool {
        self.entry_path(key).exists()
    }

    /// Removes every cached allocation of one experiment. Returns the number
    /// of entries removed.
    pub fn evict_experiment(&self, experiment_id: &ExperimentId) -> Result<usize, GatewayError> {
        let dir = self.experiment_dir(experiment_id);
        if !dir.exists() {
            return Ok(0);
        }
        let removed = count_entries(&dir)?;
        fs::remove_dir_all(&dir)?;
        Ok(removed)
    }

    /// Number of cached allocations across all experiments.
    pub fn len(&self) -> Result<usize, GatewayError> {
        let mut total = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                total += count_entries(&path)?;
            }
        }
        Ok(total)
    }

    pub fn is_empty(&self) -> Result<bool, GatewayError> {
        Ok(self.len()? == 0)
    }

    fn experiment_dir(&self, experiment_id: &ExperimentId) -> PathBuf {
        let digest = blake3::hash(experiment_id.as_str().as_bytes());
        self.cache_dir.join(digest.to_hex().as_str())
    }

    fn entry_path(&self, key: &AllocationKey) -> PathBuf {
        self.experiment_dir(&key.experiment_id)
            .join(format!("{}.json", key.digest()))
    }
}

impl AllocationCache for JsonFileAllocationCache {
    fn get(&self, key: &AllocationKey) -> Result<Option<Allocation>, GatewayError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        let allocation: Allocation = serde_json::from_str(&json)?;
        Ok(Some(allocation))
    }

    fn set(&self, key: &AllocationKey, allocation: &Allocation) -> Result<(), GatewayError> {
        let dir = self.experiment_dir(&key.experiment_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", key.digest()));
        let json = serde_json::to_string(allocation)?;
        // Unique temp name: two first-time writers for one key may race.
        let tmp = dir.join(format!("{}.{:016x}.tmp", key.digest(), rand::random::<u64>()));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn count_entries(dir: &Path) -> Result<usize, GatewayError> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use variantlab_core::domain::{VariantId, VariantSnapshot, VisitorId};

    fn allocation(experiment: &str, visitor: &str) -> Allocation {
        Allocation {
            experiment_id: ExperimentId::from(experiment),
            visitor_id: VisitorId::from(visitor),
            variant_id: VariantId::from("b"),
            variant: VariantSnapshot {
                id: VariantId::from("b"),
                name: "Variant B".into(),
                is_control: false,
                traffic_percentage: 50.0,
            },
            is_new_allocation: true,
        }
    }

    #[test]
    fn test_cache_set_get() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = JsonFileAllocationCache::new(temp_dir.path()).unwrap();

        let alloc = allocation("exp-1", "visitor-1");
        let key = alloc.key();

        assert!(!cache.contains(&key));
        assert!(cache.get(&key).unwrap().is_none());

        cache.set(&key, &alloc).unwrap();

        assert!(cache.contains(&key));
        assert_eq!(cache.get(&key).unwrap(), Some(alloc));
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let alloc = allocation("exp-1", "visitor/with/slashes");
        {
            let cache = JsonFileAllocationCache::new(temp_dir.path()).unwrap();
            cache.set(&alloc.key(), &alloc).unwrap();
        }

        let reopened = JsonFileAllocationCache::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.get(&alloc.key()).unwrap(), Some(alloc));
    }

    #[test]
    fn test_evict_experiment() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = JsonFileAllocationCache::new(temp_dir.path()).unwrap();

        for i in 0..5 {
            let alloc = allocation("exp-old", &format!("visitor-{i}"));
            cache.set(&alloc.key(), &alloc).unwrap();
        }
        let keep = allocation("exp-live", "visitor-0");
        cache.set(&keep.key(), &keep).unwrap();
        assert_eq!(cache.len().unwrap(), 6);

        let removed = cache
            .evict_experiment(&ExperimentId::from("exp-old"))
            .unwrap();
        assert_eq!(removed, 5);
        assert_eq!(cache.len().unwrap(), 1);
        assert!(cache.contains(&keep.key()));
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = JsonFileAllocationCache::new(temp_dir.path()).unwrap();
        let alloc = allocation("exp-1", "visitor-1");
        cache.set(&alloc.key(), &alloc).unwrap();

        fs::write(cache.entry_path(&alloc.key()), "{ not json").unwrap();
        let err = cache.get(&alloc.key()).unwrap_err();
        assert!(matches!(err, GatewayError::Serialization(_)));
    }
}
