//! hivekeeper.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HivekeeperConfig {
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub dispatcher: DispatcherConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall-clock length of one polling-interval step.
    pub interval_unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub request_timeout: String,
    /// Missed keep-alive periods tolerated before an actuator is
    /// declared unreachable.
    pub max_failed_keepalive: u32,
    pub actuator_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/hivekeeper/hivekeeper.redb"),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_unit: "60s".to_string(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: "5s".to_string(),
            max_failed_keepalive: 3,
            actuator_port: 5683,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info,hivekeeper=debug".to_string(),
        }
    }
}

impl HivekeeperConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    /// Parse and validate a configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HivekeeperConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = self.interval_unit()?;
        if unit.is_zero() {
            return Err(ConfigError::Invalid(
                "scheduler.interval_unit must be greater than zero".to_string(),
            ));
        }
        let timeout = self.request_timeout()?;
        if timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "dispatcher.request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.dispatcher.max_failed_keepalive == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.max_failed_keepalive must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval_unit(&self) -> Result<Duration, ConfigError> {
        parse_field("scheduler.interval_unit", &self.scheduler.interval_unit)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_field("dispatcher.request_timeout", &self.dispatcher.request_timeout)
    }
}

fn parse_field(name: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value)
        .ok_or_else(|| ConfigError::Invalid(format!("{name}: unrecognised duration {value:?}")))
}
