// Copyright 2026 Daniel Pelikan
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

//! Configuration module.
//!
//! Handles loading and saving session settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::SPP_UUID;

/// Directory name under the platform config dir.
const APP_DIR: &str = "spp-session";

/// Session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Link timeouts and service selection.
    pub session: SessionConfig,

    /// Initial capability grants.
    pub permissions: PermissionConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound for opening the link, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Upper bound for a single write, in milliseconds.
    pub send_timeout_ms: u64,

    /// Service class to connect to. Standard SPP unless the peer differs.
    pub service_uuid: Uuid,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 15_000,
            send_timeout_ms: 5_000,
            service_uuid: SPP_UUID,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Grant the scan capability at startup.
    pub scan: bool,

    /// Grant the connect capability at startup.
    pub connect: bool,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            scan: true,
            connect: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "spp_session=info".to_string(),
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from the default location or create it.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save configuration to an explicit file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.session.service_uuid, SPP_UUID);
        assert_eq!(config.session.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.session.send_timeout(), Duration::from_secs(5));
        assert!(config.permissions.connect);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.session.connect_timeout_ms = 2_500;
        config.permissions.scan = false;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.session.connect_timeout_ms, 2_500);
        assert!(!loaded.permissions.scan);
        assert_eq!(loaded.session.service_uuid, SPP_UUID);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session]\nsend_timeout_ms = 100\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.session.send_timeout_ms, 100);
        assert_eq!(config.session.connect_timeout_ms, 15_000);
        assert_eq!(config.logging.filter, "spp_session=info");
    }

    #[test]
    fn test_service_uuid_is_hyphenated_in_toml() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(content.contains("00001101-0000-1000-8000-00805f9b34fb"));
    }
}
