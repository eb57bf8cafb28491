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
//! Handles loading and saving link settings.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bluetooth::constants::defaults;

const APP_DIR: &str = "rfcomm-link";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection service settings.
    pub link: LinkConfig,

    /// Adapter and peer settings.
    pub adapter: AdapterConfig,
}

/// Settings consumed by [`crate::ConnectionService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Listen on the secure service record.
    pub listen_secure: bool,

    /// Listen on the insecure service record.
    pub listen_insecure: bool,

    /// Maximum bytes per read (and per `MessageReceived` event).
    pub read_buffer_size: usize,

    /// Emit `MessageSent` after each successful write.
    pub echo_sent: bool,

    /// Automatic re-listen attempts after an accept error.
    pub listen_retry_limit: u32,

    /// Pause before re-listening, in milliseconds.
    pub listen_retry_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            listen_secure: true,
            listen_insecure: true,
            read_buffer_size: defaults::READ_BUFFER_SIZE,
            echo_sent: true,
            listen_retry_limit: defaults::LISTEN_RETRY_LIMIT,
            listen_retry_delay_ms: defaults::LISTEN_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Adapter to use, e.g. "hci0". The default adapter when unset.
    pub name: Option<String>,

    /// Advertised device name.
    pub alias: Option<String>,

    /// Length of the startup discovery window in seconds. 0 disables it.
    pub discovery_window_secs: u64,

    /// Address to dial on startup.
    pub peer: Option<String>,

    /// Dial `peer` on the secure service record.
    pub secure: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: None,
            alias: None,
            discovery_window_secs: defaults::DISCOVERY_WINDOW_SECS,
            peer: None,
            secure: true,
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

    /// Load configuration from the default file or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.link.read_buffer_size > 0,
            "link.read_buffer_size must be greater than zero"
        );
        ensure!(
            self.link.listen_secure || self.link.listen_insecure,
            "at least one of link.listen_secure and link.listen_insecure must be enabled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert!(config.link.listen_secure);
        assert!(config.link.listen_insecure);
        assert_eq!(config.link.read_buffer_size, 1024);
        assert_eq!(config.adapter.discovery_window_secs, 5);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[link]\nlisten_insecure = false\n\n[adapter]\npeer = \"AA:BB:CC:DD:EE:FF\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.link.listen_secure);
        assert!(!config.link.listen_insecure);
        assert!(config.link.echo_sent);
        assert_eq!(config.adapter.peer.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert!(config.adapter.secure);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.link.listen_retry_limit = 3;
        config.adapter.alias = Some("Desk".into());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.link.listen_retry_limit, 3);
        assert_eq!(loaded.adapter.alias.as_deref(), Some("Desk"));
    }

    #[test]
    fn test_rejects_no_listen_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[link]\nlisten_secure = false\nlisten_insecure = false\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
