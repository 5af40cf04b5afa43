// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Timer wheel configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of pool nodes and wheel slots.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Default tick width in milliseconds.
pub const DEFAULT_TICK_WIDTH_MS: u64 = 5;

/// Configuration for a [`TimerWheel`](crate::TimerWheel).
///
/// Missing fields fall back to their defaults when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Pool size, which is also the number of slots. Fixed for the wheel's lifetime.
    pub capacity: usize,
    /// Width of one tick in milliseconds. Zero makes the wheel untimed.
    pub tick_width_ms: u64,
    /// Spawn the ticking thread on construction.
    pub autostart: bool,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            tick_width_ms: DEFAULT_TICK_WIDTH_MS,
            autostart: true,
        }
    }
}

impl WheelConfig {
    /// The tick width as a [`Duration`].
    pub fn tick_width(&self) -> Duration {
        Duration::from_millis(self.tick_width_ms)
    }

    /// Rejects configurations the wheel cannot be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be at least 1".into()));
        }
        if self.capacity > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "capacity {} exceeds the handle range",
                self.capacity
            )));
        }
        Ok(())
    }

    /// Parses and validates a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
