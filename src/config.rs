//! # Configuration Persistence
//!
//! Manages user configuration stored in `~/.config/launchrank/config.json`.
//!
//! ## Overview
//!
//! The [`Config`] struct is serialized to / deserialized from a JSON file in
//! the user's XDG config directory. Every field has a default, so an empty
//! object (or a missing file) yields a working configuration.
//!
//! ## File Location
//!
//! ```text
//! ~/.config/launchrank/config.json
//! ~/.local/share/launchrank/usage.json   (default usage store)
//! ```
//!
//! The `directories` crate is used to resolve the platform-appropriate
//! config and data directories.

use crate::error::ValidationError;
use crate::rank::MatchPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SECS_PER_DAY: u64 = 86_400;

/// Options for the durable usage file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Attempts per write before an I/O error is surfaced.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry, doubled on each further attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Flush the temporary file to disk before renaming it into place.
    #[serde(default = "default_true")]
    pub fsync: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            fsync: true,
        }
    }
}

impl StorageConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Persisted user configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Time for the recency weight to fall to one half.
    #[serde(default = "default_half_life_secs")]
    pub half_life_secs: u64,

    /// Records idle for longer than this are candidates for pruning.
    #[serde(default = "default_staleness_horizon_secs")]
    pub staleness_horizon_secs: u64,

    /// Stale records launched fewer times than this are pruned.
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: u64,

    /// Upper bound on stored records; least recently used are evicted first.
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Default number of results returned by a ranking query.
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    #[serde(default)]
    pub match_policy: MatchPolicy,

    /// Identity prefixes whose scores are scaled by `demotion_factor`.
    #[serde(default = "default_demoted_prefixes")]
    pub demoted_prefixes: Vec<String>,

    #[serde(default = "default_demotion_factor")]
    pub demotion_factor: f64,

    /// Group size for order stabilization, 0 disables it.
    #[serde(default = "default_stabilize_group_size")]
    pub stabilize_group_size: usize,

    /// Ranking slower than this is logged as a warning.
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,

    /// Capacity of the launch event queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Usage file location, defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
}

fn default_half_life_secs() -> u64 {
    7 * SECS_PER_DAY
}

fn default_staleness_horizon_secs() -> u64 {
    90 * SECS_PER_DAY
}

fn default_noise_threshold() -> u64 {
    3
}

fn default_max_records() -> usize {
    1500
}

fn default_result_limit() -> usize {
    20
}

fn default_demoted_prefixes() -> Vec<String> {
    vec![
        "com.android.settings.".to_string(),
        "android.settings.".to_string(),
    ]
}

fn default_demotion_factor() -> f64 {
    0.99
}

fn default_stabilize_group_size() -> usize {
    4
}

fn default_latency_budget_ms() -> u64 {
    20
}

fn default_queue_capacity() -> usize {
    64
}

fn default_maintenance_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            half_life_secs: default_half_life_secs(),
            staleness_horizon_secs: default_staleness_horizon_secs(),
            noise_threshold: default_noise_threshold(),
            max_records: default_max_records(),
            result_limit: default_result_limit(),
            match_policy: MatchPolicy::default(),
            demoted_prefixes: default_demoted_prefixes(),
            demotion_factor: default_demotion_factor(),
            stabilize_group_size: default_stabilize_group_size(),
            latency_budget_ms: default_latency_budget_ms(),
            queue_capacity: default_queue_capacity(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            storage: StorageConfig::default(),
            data_file: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location. Returns
    /// `Config::default()` if the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path. Returns `Config::default()` if
    /// the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save the current configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        fn invalid(field: &'static str, reason: &str) -> ValidationError {
            ValidationError::Config {
                field,
                reason: reason.to_string(),
            }
        }

        if self.half_life_secs == 0 {
            return Err(invalid("half_life_secs", "must be greater than zero"));
        }
        if self.result_limit == 0 {
            return Err(invalid("result_limit", "must be greater than zero"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be greater than zero"));
        }
        if self.max_records == 0 {
            return Err(invalid("max_records", "must be greater than zero"));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(invalid(
                "maintenance_interval_secs",
                "must be greater than zero",
            ));
        }
        if self.storage.retry_attempts == 0 {
            return Err(invalid("storage.retry_attempts", "must be at least 1"));
        }
        if !(self.demotion_factor > 0.0 && self.demotion_factor <= 1.0) {
            return Err(invalid("demotion_factor", "must be in (0, 1]"));
        }
        Ok(())
    }

    pub fn half_life(&self) -> Duration {
        Duration::from_secs(self.half_life_secs)
    }

    pub fn staleness_horizon(&self) -> Duration {
        Duration::from_secs(self.staleness_horizon_secs)
    }

    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// Usage file to open: the configured one or the platform default.
    pub fn resolve_data_file(&self) -> Result<PathBuf> {
        match &self.data_file {
            Some(path) => Ok(path.clone()),
            None => Self::default_data_file(),
        }
    }

    /// Return the path to the config file.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.json"))
    }

    fn default_data_file() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join("usage.json"))
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "launchrank")
        .context("Could not determine application directories")
}
