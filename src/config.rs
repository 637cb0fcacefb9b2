//! Configuration management for acoustic-planner
//!
//! Stores settings in ~/.config/acoustic-planner/config.toml. The API key is
//! never written here; it comes from `ACOUSTIC_API_KEY` or the keychain.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "acoustic-planner";
const CONFIG_FILE: &str = "config.toml";

/// Design generation can run for a long time; never wait less than this
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 20 * 60;

const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:20000";
const DEFAULT_SERVICE_USER: &str = "acoustic_user_001";

const API_KEY_ENV: &str = "ACOUSTIC_API_KEY";
const SERVICE_URL_ENV: &str = "ACOUSTIC_SERVICE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat-flow service
    pub service_url: String,
    /// User tag sent with every request
    pub service_user: String,
    pub request_timeout_secs: u64,
    /// Where the catalog and history documents live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            service_user: DEFAULT_SERVICE_USER.to_string(),
            request_timeout_secs: MIN_REQUEST_TIMEOUT_SECS,
            data_dir: None,
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load config from disk with environment overrides applied, or defaults
    pub fn load() -> Self {
        let mut config = Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();
        if let Ok(url) = std::env::var(SERVICE_URL_ENV) {
            if !url.trim().is_empty() {
                config.service_url = url;
            }
        }
        config
    }

    /// Load from an explicit path. A corrupt file is moved aside and
    /// defaults are returned.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| anyhow::anyhow!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)?;
        crate::store::write_atomic(path, &content)
            .map_err(|e| anyhow::anyhow!("Failed to write config: {}", e))?;
        Ok(())
    }

    /// Effective request timeout, never below the generation ceiling
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(MIN_REQUEST_TIMEOUT_SECS))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|p| p.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from(".acoustic"))
    }

    /// API key from the environment, then the keychain
    pub fn api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Some(key);
            }
        }
        match crate::keyring::get_api_key() {
            Ok(key) => key,
            Err(err) => {
                crate::keyring::warn_keychain_error_once(&err);
                None
            }
        }
    }

    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("~/.config/{}/{}", APP_DIR, CONFIG_FILE))
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("toml.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_never_below_ceiling() {
        let config = Config {
            request_timeout_secs: 30,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(1200));

        let config = Config {
            request_timeout_secs: 3600,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn test_save_and_load_round() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            service_url: "http://10.0.0.5:20000".into(),
            data_dir: Some(dir.path().join("data")),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "request_timeout_secs = 2400\n").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.request_timeout_secs, 2400);
        assert_eq!(config.service_user, DEFAULT_SERVICE_USER);
    }

    #[test]
    fn test_corrupt_file_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "service_url = [").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        assert!(path.with_extension("toml.corrupt").exists());
    }
}
