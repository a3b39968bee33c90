//! Configuration module for bibsync.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation and defaults. Process bootstrapping
//! (logger setup, wiring) lives outside the engine; this module only
//! carries the knobs the engine and its adapters consume.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Remote listing page cap enforced by the service
const MAX_PAGE_SIZE: u32 = 100;

/// Top-level configuration for bibsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub vault: VaultConfig,
    pub logging: LoggingConfig,
}

/// Remote library service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the remote library service.
    pub base_url: String,
    /// Bearer token for the remote API.
    pub api_key: String,
    /// Remote user id owning the API key.
    pub user_id: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.bibhub.org".to_string(),
            api_key: String::new(),
            user_id: 0,
        }
    }
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between sync cycles.
    pub poll_interval: u64,
    /// Page size for version listings (capped by the remote at 100).
    pub page_size: u32,
    /// Libraries to sync; empty means every library the key can read.
    pub libraries: Vec<i64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: 300,
            page_size: MAX_PAGE_SIZE,
            libraries: Vec::new(),
        }
    }
}

/// Attachment vault settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory for the local attachment vault.
    pub root: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: default_data_dir().join("vault"),
        }
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Returns the default data directory (`~/.local/share/bibsync` on Linux)
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bibsync")
}

impl Config {
    /// Loads configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values
    ///
    /// # Errors
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api.base_url.is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }
        if self.api.api_key.is_empty() {
            anyhow::bail!("api.api_key must not be empty");
        }
        if self.sync.page_size == 0 {
            anyhow::bail!("sync.page_size must be positive");
        }
        if self.sync.page_size > MAX_PAGE_SIZE {
            anyhow::bail!(
                "sync.page_size must not exceed the remote cap of {MAX_PAGE_SIZE}"
            );
        }
        if self.sync.poll_interval == 0 {
            anyhow::bail!("sync.poll_interval must be positive");
        }
        Ok(())
    }
}
