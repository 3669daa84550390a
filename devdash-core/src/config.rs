use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::format::Thresholds;
use crate::process::RuntimeMatcher;

/// Shortest accepted refresh interval, in seconds.
pub const MIN_REFRESH_RATE: f64 = 0.1;
/// Longest accepted refresh interval or cycle timeout, in seconds.
pub const MAX_INTERVAL: f64 = 86_400.0;
const MIN_CYCLE_TIMEOUT: f64 = 5.0;

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DevdashConfig {
    /// Seconds between collection cycles
    pub refresh_rate: f64,

    /// Maximum number of process rows shown
    pub process_limit: usize,

    /// Ports that raise a notice when a process starts listening on them
    pub watched_ports: BTreeSet<u16>,

    /// Percent below which a value is rendered as ok
    pub color_threshold_low: f64,

    /// Percent at or above which a value is rendered as critical
    pub color_threshold_high: f64,

    /// Seconds a cycle may take before it is abandoned
    pub cycle_timeout: Option<f64>,

    /// Runtime-family needles matched against process names
    pub process_names: Vec<String>,

    /// Directory where manifest walks stop
    pub project_boundary: Option<PathBuf>,
}

impl Default for DevdashConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 3.0,
            process_limit: 80,
            watched_ports: BTreeSet::new(),
            color_threshold_low: 50.0,
            color_threshold_high: 80.0,
            cycle_timeout: None,
            process_names: vec!["node".into()],
            project_boundary: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl DevdashConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: DevdashConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields defaults. A broken file is logged and also yields
    /// defaults, with the error handed back so the caller can surface it.
    pub fn load_or_default(path: &Path) -> (Self, Option<ConfigError>) {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return (Self::default(), None);
        }
        match Self::load(path) {
            Ok(config) => {
                log::info!("loaded config from {}", path.display());
                (config, None)
            }
            Err(e) => {
                log::error!("config {} rejected: {}", path.display(), e);
                (Self::default(), Some(e))
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_REFRESH_RATE..=MAX_INTERVAL).contains(&self.refresh_rate)
            || Duration::try_from_secs_f64(self.refresh_rate).is_err()
        {
            return Err(ConfigError::Invalid(format!(
                "refresh_rate must be between {} and {} seconds, got {}",
                MIN_REFRESH_RATE, MAX_INTERVAL, self.refresh_rate
            )));
        }
        if self.process_limit == 0 {
            return Err(ConfigError::Invalid("process_limit must be at least 1".into()));
        }
        if !self.color_threshold_low.is_finite() || !self.color_threshold_high.is_finite() {
            return Err(ConfigError::Invalid("color thresholds must be finite".into()));
        }
        if self.color_threshold_low >= self.color_threshold_high {
            return Err(ConfigError::Invalid(format!(
                "color_threshold_low ({}) must be below color_threshold_high ({})",
                self.color_threshold_low, self.color_threshold_high
            )));
        }
        if let Some(timeout) = self.cycle_timeout {
            if !(MIN_REFRESH_RATE..=MAX_INTERVAL).contains(&timeout)
                || Duration::try_from_secs_f64(timeout).is_err()
            {
                return Err(ConfigError::Invalid(format!(
                    "cycle_timeout must be between {} and {} seconds, got {}",
                    MIN_REFRESH_RATE, MAX_INTERVAL, timeout
                )));
            }
        }
        Ok(())
    }

    /// Never zero. Out-of-range values (only possible when fields were set
    /// without `validate`) are clamped into the accepted range.
    pub fn refresh_interval(&self) -> Duration {
        bounded_secs(self.refresh_rate, Self::default().refresh_rate)
    }

    /// Defaults to twice the refresh interval, but at least five seconds.
    pub fn cycle_timeout(&self) -> Duration {
        let secs = self
            .cycle_timeout
            .unwrap_or_else(|| (self.refresh_interval().as_secs_f64() * 2.0).max(MIN_CYCLE_TIMEOUT));
        bounded_secs(secs, MIN_CYCLE_TIMEOUT)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            low: self.color_threshold_low,
            high: self.color_threshold_high,
        }
    }

    pub fn runtime_matcher(&self) -> RuntimeMatcher {
        if self.process_names.iter().all(|n| n.trim().is_empty()) {
            RuntimeMatcher::default()
        } else {
            RuntimeMatcher::new(&self.process_names)
        }
    }
}

fn bounded_secs(secs: f64, fallback: f64) -> Duration {
    let secs = if secs.is_nan() { fallback } else { secs };
    let secs = secs.clamp(MIN_REFRESH_RATE, MAX_INTERVAL);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(3))
}

/// `~/.config/devdash/config.toml`
pub fn default_config_path(home: &Path) -> PathBuf {
    home.join(".config").join("devdash").join("config.toml")
}

/// `~/.local/share/devdash`, where logs and exports go.
pub fn default_data_dir(home: &Path) -> PathBuf {
    home.join(".local").join("share").join("devdash")
}
