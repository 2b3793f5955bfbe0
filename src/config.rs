//! Alerts configuration, loaded from `~/.dailyos/alerts.json`.
//!
//! Every field has a default so a missing or partial file is valid. Intervals
//! are plain integers so tests can compress time windows from JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::proactive::tier::TierThresholds;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "DAILYOS_ALERTS_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsConfig {
    /// Delay between two status polls of the same job.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Total lifetime of a tracked job before it is resolved as failed.
    /// `null` polls forever.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: Option<u64>,
    /// Consecutive transient provider errors tolerated per job. `null` retries forever.
    #[serde(default = "default_max_consecutive_poll_errors")]
    pub max_consecutive_poll_errors: Option<u32>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Minimum gap between two sweeps, including early wakeups.
    #[serde(default = "default_min_sweep_gap_secs")]
    pub min_sweep_gap_secs: u64,
    #[serde(default)]
    pub thresholds: TierThresholds,
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    2500
}
fn default_job_timeout_secs() -> Option<u64> {
    Some(30 * 60)
}
fn default_max_consecutive_poll_errors() -> Option<u32> {
    Some(120)
}
fn default_sweep_interval_secs() -> u64 {
    3600
}
fn default_min_sweep_gap_secs() -> u64 {
    60
}
fn default_notification_capacity() -> usize {
    200
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            job_timeout_secs: default_job_timeout_secs(),
            max_consecutive_poll_errors: default_max_consecutive_poll_errors(),
            sweep_interval_secs: default_sweep_interval_secs(),
            min_sweep_gap_secs: default_min_sweep_gap_secs(),
            thresholds: TierThresholds::default(),
            notification_capacity: default_notification_capacity(),
            ledger_path: None,
        }
    }
}

impl AlertsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn min_sweep_gap(&self) -> Duration {
        Duration::from_secs(self.min_sweep_gap_secs)
    }

    /// Ledger database path, falling back to `~/.dailyos/alerts.db`.
    pub fn resolved_ledger_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.ledger_path {
            Some(p) => Ok(PathBuf::from(p)),
            None => crate::db::default_db_path().map_err(|_| ConfigError::HomeDirNotFound),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("pollIntervalMs must be > 0".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweepIntervalSecs must be > 0".into()));
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::Invalid("notificationCapacity must be > 0".into()));
        }
        self.thresholds.validate().map_err(ConfigError::Invalid)
    }
}

/// Load and validate configuration from an explicit path.
pub fn load_config(path: &Path) -> Result<AlertsConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: AlertsConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `$DAILYOS_ALERTS_CONFIG` or `~/.dailyos/alerts.json`.
///
/// A missing file yields the defaults; an unreadable or invalid one is an error.
pub fn load_default_config() -> Result<AlertsConfig, ConfigError> {
    let path = match std::env::var_os(CONFIG_PATH_ENV) {
        Some(p) => PathBuf::from(p),
        None => dirs::home_dir()
            .ok_or(ConfigError::HomeDirNotFound)?
            .join(".dailyos")
            .join("alerts.json"),
    };

    if !path.exists() {
        log::debug!("No alerts config at {}, using defaults", path.display());
        return Ok(AlertsConfig::default());
    }

    load_config(&path)
}
