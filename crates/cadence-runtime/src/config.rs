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

//! Application configuration.

use cadence_timer::{ConfigError, WheelConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_wheel() -> WheelConfig {
    WheelConfig {
        tick_width_ms: 1,
        autostart: false,
        ..WheelConfig::default()
    }
}

/// Settings for an [`App`](crate::App).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name used in log output.
    pub name: String,
    /// Target frame rate used when `start` is given no explicit rate.
    pub fps: u32,
    /// The app's timer wheel. The tick width is applied when the app starts.
    #[serde(default = "default_wheel")]
    pub wheel: WheelConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "cadence".to_string(),
            fps: 60,
            wheel: default_wheel(),
        }
    }
}

impl AppConfig {
    /// Checks the frame rate and the wheel settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::Invalid("fps must be at least 1".into()));
        }
        self.wheel.validate()
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
}
