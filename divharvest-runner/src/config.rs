//! Serializable run configuration (`divharvest.toml`).
//!
//! Every field has a conservative default, so an empty file is a valid
//! config. CLI flags are applied on top after loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use divharvest_core::data::nasdaq::DEFAULT_BASE_URL;
use divharvest_core::pipeline::FallbackPolicy;
use divharvest_core::request::{RetryPolicy, ThrottleConfig};

/// Conventional config file name.
pub const DEFAULT_CONFIG_FILE: &str = "divharvest.toml";

/// Errors from loading or validating a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Checkpoint cadence and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub dir: PathBuf,
    /// Save after this many processed entities.
    pub every: usize,
    /// Checkpoints older than this are ignored on load.
    pub staleness_hours: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("checkpoint"),
            every: 25,
            staleness_hours: 4,
        }
    }
}

impl CheckpointConfig {
    pub fn staleness(&self) -> chrono::Duration {
        // capped at ~100 years to stay inside chrono's range
        chrono::Duration::hours(self.staleness_hours.min(876_000) as i64)
    }
}

/// Top-level configuration for one collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub base_url: String,
    /// Entities processed together in one group; 1 means sequential.
    pub concurrency: usize,
    pub fallback: FallbackPolicy,
    /// Entries kept in each ranking.
    pub top_n: usize,
    /// Restrict the run to these symbols. Empty means the full listing.
    pub symbols: Vec<String>,
    /// Keep only the first `limit` listed entities.
    pub limit: Option<usize>,
    /// Suspend after this many entities in one segment.
    pub max_entities: Option<usize>,
    /// Growth lookback for entities without payment history.
    pub default_lookback_years: u32,
    pub throttle: ThrottleConfig,
    pub retry: RetryPolicy,
    pub checkpoint: CheckpointConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            concurrency: 4,
            fallback: FallbackPolicy::default(),
            top_n: 20,
            symbols: Vec::new(),
            limit: None,
            max_entities: None,
            default_lookback_years: 10,
            throttle: ThrottleConfig::default(),
            retry: RetryPolicy::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl HarvestConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would make the run misbehave rather than fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.checkpoint.every == 0 {
            return Err(ConfigError::Invalid("checkpoint.every must be at least 1".into()));
        }
        if self.throttle.min_delay_ms > self.throttle.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "throttle.min_delay_ms ({}) exceeds throttle.max_delay_ms ({})",
                self.throttle.min_delay_ms, self.throttle.max_delay_ms
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if !(self.retry.backoff_factor > 1.0) {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_factor must be greater than 1 (got {})",
                self.retry.backoff_factor
            )));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url is empty".into()));
        }
        Ok(())
    }
}
