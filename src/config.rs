//! Call core configuration
//!
//! Settings are plain serde structs so the frontend can hand them over as JSON.

use crate::utils::ConfigError;
use serde::{Deserialize, Serialize};

/// Default size of the event broadcast channels
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Configuration for a call session controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallConfig {
    /// Capacity of the call event channel
    pub event_capacity: usize,

    /// Upper bound on buffered recording bytes (unbounded if absent)
    pub max_recording_bytes: Option<usize>,

    /// Settings for recording playback
    pub player: PlayerConfig,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_recording_bytes: None,
            player: PlayerConfig::default(),
        }
    }
}

impl CallConfig {
    /// Parse and validate a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CallConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "eventCapacity must be greater than zero".to_string(),
            ));
        }
        self.player.validate()
    }
}

/// Configuration for a recording player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerConfig {
    /// Capacity of the player event channel
    pub event_capacity: usize,

    /// Volume a freshly created player starts at (0.0 - 1.0)
    pub initial_volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            initial_volume: 1.0,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "player.eventCapacity must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(ConfigError::Invalid(format!(
                "player.initialVolume must be within 0.0-1.0, got {}",
                self.initial_volume
            )));
        }
        Ok(())
    }
}
