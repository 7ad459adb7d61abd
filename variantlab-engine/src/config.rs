//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! [statistics]
//! default_confidence_level = 0.95
//! min_sample_size = 100
//! conclusive_sample_size = 1000
//! power = 0.8
//! minimum_detectable_effect = 0.1
//!
//! [cache]
//! backend = "file"
//! dir = "allocations"
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use variantlab_core::stats::{
    ConfidenceLevel, SignificanceTest, DEFAULT_MIN_SAMPLE_SIZE, DEFAULT_POWER,
};

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub statistics: StatisticsConfig,
    pub cache: CacheConfig,
}

/// Parameters of significance testing and recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Used when an experiment carries no valid confidence level.
    pub default_confidence_level: ConfidenceLevel,
    /// Visitors per variant below which no test is run.
    pub min_sample_size: u64,
    /// Visitors per variant after which "no difference" is treated as final.
    pub conclusive_sample_size: u64,
    /// Power used when estimating how many more visitors are needed.
    pub power: f64,
    /// Relative lift (0.1 = 10%) the sample-size planner targets.
    pub minimum_detectable_effect: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            default_confidence_level: ConfidenceLevel::default(),
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            conclusive_sample_size: 1_000,
            power: DEFAULT_POWER,
            minimum_detectable_effect: 0.1,
        }
    }
}

impl StatisticsConfig {
    /// Significance test at `level` with the configured sample floor.
    pub fn significance_test(&self, level: ConfidenceLevel) -> SignificanceTest {
        SignificanceTest::new(level, self.min_sample_size)
    }
}

/// Which allocation cache backend to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Root directory for the file backend.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            dir: PathBuf::from("allocations"),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let stats = &self.statistics;
        if !(stats.power > 0.0 && stats.power < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "statistics.power must be in (0, 1), got {}",
                stats.power
            )));
        }
        if !(stats.minimum_detectable_effect > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "statistics.minimum_detectable_effect must be positive, got {}",
                stats.minimum_detectable_effect
            )));
        }
        if stats.conclusive_sample_size < stats.min_sample_size {
            return Err(ConfigError::Invalid(format!(
                "statistics.conclusive_sample_size ({}) is below min_sample_size ({})",
                stats.conclusive_sample_size, stats.min_sample_size
            )));
        }
        Ok(())
    }
}
