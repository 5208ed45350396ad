//! Configuration management for Latercast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Tuning for the reconciliation loop.
///
/// All intervals and durations are in seconds. None of the triggers are
/// assumed to fire at a precise time; they only bound how stale the queue
/// can get.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fine-grained poll interval for the reconciliation loop.
    pub poll_interval: u64,
    /// Coarse wake interval, catching up after process suspension.
    pub wake_interval: u64,
    /// How long one publish pass may hold a post before its lease is
    /// considered stale and another pass may re-lease it.
    pub lease_duration: u64,
    /// Upper bound on a single platform publish call.
    pub publish_timeout: u64,
    /// How far in the past `scheduled_for` may lie and still be accepted
    /// by the schedule command.
    pub schedule_grace: u64,
    pub retry: RetryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            wake_interval: 900,
            lease_duration: 120,
            publish_timeout: 30,
            schedule_grace: 300,
            retry: RetryConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    pub fn wake_interval(&self) -> Duration {
        Duration::from_secs(self.wake_interval.max(1))
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout.max(1))
    }
}

/// Policy for automatically re-queueing a post whose every platform
/// attempt failed. Disabled by default: a failed post then stays `failed`
/// until explicitly rescheduled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Maximum number of publish passes, the first attempt included.
    pub max_retries: u32,
    /// Base delay in seconds; attempt N waits N times this long.
    pub retry_delay: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 3,
            retry_delay: 300,
        }
    }
}

/// Simulated-delivery settings used by the hosting binaries.
///
/// Real deployments register their own `PlatformPublisher` implementations;
/// this section drives the built-in simulated publishers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    /// Platform identifiers posts may target.
    pub enabled: Vec<String>,
    /// Probability in [0, 1] that a simulated publish attempt fails.
    pub failure_rate: f64,
    /// Artificial latency per simulated publish call, in milliseconds.
    pub publish_delay_ms: u64,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["instagram".to_string(), "facebook".to_string()],
            failure_rate: 0.0,
            publish_delay_ms: 0,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/latercast/posts.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            platforms: PlatformsConfig::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("LATERCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("latercast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("latercast"))
}
