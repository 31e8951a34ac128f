//! Tracker tuning: delays, batch size, capacity ceiling, and queue bounds.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures loading a [`TrackerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for this schema.
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime configuration for the tracker.
///
/// Every field has a default, so a TOML file only needs the values it changes:
///
/// ```toml
/// channel_delay = "5s"
/// group_delay = "3s"
/// group_capacity = 1024
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Recipients followed back-to-back before a channel delay.
    pub channel_batch_size: usize,
    /// Pause between channel batches.
    #[serde(with = "humantime_serde")]
    pub channel_delay: Duration,
    /// Pause between group additions.
    #[serde(with = "humantime_serde")]
    pub group_delay: Duration,
    /// Participant ceiling applied to every group.
    pub group_capacity: u32,
    /// Upper bound on any single external call.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// Largest recipient list accepted per request.
    pub max_recipients: usize,
    /// Command queue depth between handles and the runtime loop.
    pub command_queue_bound: usize,
    /// Broadcast buffer for progress events.
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            channel_batch_size: 5,
            channel_delay: Duration::from_secs(5),
            group_delay: Duration::from_secs(3),
            group_capacity: 1024,
            call_timeout: Duration::from_secs(30),
            max_recipients: 1000,
            command_queue_bound: 256,
            event_capacity: 1024,
        }
    }
}

impl TrackerConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Rejects values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_batch_size == 0 {
            return Err(ConfigError::Invalid("channel_batch_size must be at least 1".into()));
        }
        if self.group_capacity == 0 {
            return Err(ConfigError::Invalid("group_capacity must be at least 1".into()));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::Invalid("call_timeout must be non-zero".into()));
        }
        if self.max_recipients == 0 {
            return Err(ConfigError::Invalid("max_recipients must be at least 1".into()));
        }
        if self.command_queue_bound == 0 || self.event_capacity == 0 {
            return Err(ConfigError::Invalid("queue bounds must be at least 1".into()));
        }
        Ok(())
    }
}
