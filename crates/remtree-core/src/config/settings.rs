//! Engine configuration loaded from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Top-level configuration.
///
/// All fields have defaults so the engine works without a config file.
/// Call [`Config::load`] to read from a TOML path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub preload: PreloadConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::PermissionDenied`] if the file is not readable.
    /// - [`CoreError::ConfigParse`] if the TOML is malformed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied(path.to_path_buf()),
            _ => CoreError::Io(e),
        })?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }
}

/// Background prefetch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum simultaneously running preload fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Apply `concurrency` to each connection instead of globally.
    #[serde(default)]
    pub per_connection: bool,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_concurrency(),
            per_connection: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_cap: default_result_cap(),
        }
    }
}

/// Tree materialization preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Periodic full refresh; `0` disables.
    #[serde(default)]
    pub auto_refresh_secs: u64,
    /// Coalescing window for connectivity changes.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_true")]
    pub show_hidden: bool,
    #[serde(default = "default_true")]
    pub dirs_first: bool,
}

impl TreeConfig {
    pub fn auto_refresh(&self) -> Option<Duration> {
        (self.auto_refresh_secs > 0).then(|| Duration::from_secs(self.auto_refresh_secs))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            auto_refresh_secs: 0,
            debounce_ms: default_debounce_ms(),
            show_hidden: true,
            dirs_first: true,
        }
    }
}

/// An SFTP host to connect at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    3
}

fn default_result_cap() -> usize {
    500
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_port() -> u16 {
    22
}
