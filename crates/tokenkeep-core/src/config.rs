//! Application configuration management.
//!
//! This module handles loading and saving the configuration, which names the
//! login server, where the session token is persisted, and the last username
//! used to sign in.
//!
//! Configuration is stored at `~/.config/tokenkeep/config.json`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::{FileSessionStore, KeyringSessionStore, MemorySessionStore, SessionStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tokenkeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `auth_base_url`
pub const AUTH_BASE_URL_ENV: &str = "TOKENKEEP_AUTH_BASE_URL";

const DEFAULT_AUTH_BASE_URL: &str = "http://localhost:8080";

/// Name of the persisted token slot
const DEFAULT_TOKEN_KEY: &str = "authToken";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the session token survives restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// A file in the cache directory
    #[default]
    File,
    /// The OS keychain
    Keyring,
    /// Nowhere: the session ends with the process
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth_base_url: String,
    pub storage: StorageBackend,
    pub token_key: String,
    pub request_timeout_secs: u64,
    /// Poll for expiry on a timer. Off by default: expiry is checked on read.
    pub expiry_poll_secs: Option<u64>,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            storage: StorageBackend::default(),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            expiry_poll_secs: None,
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if missing), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Self::from_json(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(AUTH_BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.auth_base_url = url.trim().to_string();
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn expiry_poll_interval(&self) -> Option<Duration> {
        self.expiry_poll_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Open the configured token store
    pub fn open_store(&self) -> Result<Arc<dyn SessionStore>> {
        let store: Arc<dyn SessionStore> = match self.storage {
            StorageBackend::File => {
                Arc::new(FileSessionStore::new(self.cache_dir()?, &self.token_key))
            }
            StorageBackend::Keyring => Arc::new(KeyringSessionStore::new(self.token_key.clone())),
            StorageBackend::Memory => Arc::new(MemorySessionStore::new()),
        };
        Ok(store)
    }
}
