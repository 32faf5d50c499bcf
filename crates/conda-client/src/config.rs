//! Client settings.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/runt-conda/settings.json
//! - Linux: ~/.config/runt-conda/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\runt-conda\settings.json
//!
//! `CONDA_CLIENT_URL` overrides the base URL from the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable that overrides [`ClientConfig::base_url`].
pub const BASE_URL_ENV: &str = "CONDA_CLIENT_URL";

/// Settings for talking to the conda service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the notebook server hosting the `conda/` endpoints.
    pub base_url: String,

    /// Delay between polls of a `202 Accepted` operation.
    pub poll_interval_ms: u64,

    /// Polls to attempt before giving up on a long-running operation.
    pub max_poll_attempts: u32,

    /// TCP connect timeout.
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888/".to_string(),
            poll_interval_ms: 1000,
            max_poll_attempts: 3600,
            connect_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Replace the base URL with `CONDA_CLIENT_URL` when it is set.
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        self
    }
}

/// Get the path to the settings file
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("runt-conda")
        .join("settings.json")
}

/// Load settings from disk, returning defaults if the file doesn't exist
pub fn load_config() -> ClientConfig {
    load_config_from(&config_path()).apply_env_overrides()
}

/// Load settings from an explicit path.
///
/// A missing or unparsable file yields the defaults.
pub fn load_config_from(path: &Path) -> ClientConfig {
    if !path.exists() {
        return ClientConfig::default();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(
                "[conda-client] Ignoring invalid settings file {:?}: {}",
                path,
                e
            );
            ClientConfig::default()
        }),
        Err(e) => {
            log::warn!("[conda-client] Could not read {:?}: {}", path, e);
            ClientConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8888/");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.max_poll_attempts, 3600);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(&dir.path().join("nope.json"));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"base_url": "http://127.0.0.1:9999/lab/", "poll_interval_ms": 250}"#,
        )
        .unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.base_url, "http://127.0.0.1:9999/lab/");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.max_poll_attempts, 3600);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(load_config_from(&path), ClientConfig::default());
    }

    #[test]
    fn test_config_path_is_valid() {
        let path = config_path();
        assert!(path.ends_with("runt-conda/settings.json"));
    }
}
