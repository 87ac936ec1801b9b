//! Engine configuration.
//!
//! Loaded from a JSON file. Every field has a default, so a partial file (or
//! none at all) is valid.

use crate::error::ConfigError;
use crate::midi::DEFAULT_VELOCITY;
use crate::mixer::MasterSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sleep between scheduler steps, in milliseconds. Independent of tick
    /// length.
    pub timer_interval_ms: u64,

    /// Velocity for notes that carry none (live input).
    pub default_velocity: u8,

    /// Buffer size of channel-based playback subscriptions.
    pub notification_capacity: usize,

    /// Master transform applied on top of every routing entry.
    pub master: MasterSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timer_interval_ms: 2,
            default_velocity: DEFAULT_VELOCITY,
            notification_capacity: 1024,
            master: MasterSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_interval_ms)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if file reading or parsing fails
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
