//! Configuration file support for Dockyard.
//!
//! Dockyard supports two configuration file locations:
//! - Global: `~/.dockyard/config.toml` - User-wide defaults
//! - Project: `.dockyard/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.
//!
//! ```toml
//! [net]
//! offline = false
//! fetch-timeout = 60
//! retry-attempts = 2
//! retry-backoff-ms = 250
//!
//! [resolve]
//! max-concurrency = 8
//! cache-dir = "/var/cache/dockyard"
//! strict = false
//!
//! [[registry]]
//! name = "internal"
//! url = "https://registry.internal.example/api"
//! priority = 10
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::context::RegistryEntry;

/// Dockyard configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network settings
    pub net: NetConfig,

    /// Resolution settings
    pub resolve: ResolveConfig,

    /// Additional registries
    #[serde(rename = "registry")]
    pub registries: Vec<RegistryEntry>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetConfig {
    /// Offline mode (don't fetch from network)
    pub offline: bool,

    /// Fetch timeout in seconds
    pub fetch_timeout: Option<u64>,

    /// Retries after a failed fetch
    pub retry_attempts: Option<u32>,

    /// Initial retry delay in milliseconds, doubled per attempt
    pub retry_backoff_ms: Option<u64>,
}

/// Resolution-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolveConfig {
    /// Maximum number of concurrent fetches
    pub max_concurrency: Option<usize>,

    /// Package cache location
    pub cache_dir: Option<PathBuf>,

    /// Treat manifest warnings as errors
    pub strict: bool,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Net settings
        if other.net.offline {
            self.net.offline = true;
        }
        if other.net.fetch_timeout.is_some() {
            self.net.fetch_timeout = other.net.fetch_timeout;
        }
        if other.net.retry_attempts.is_some() {
            self.net.retry_attempts = other.net.retry_attempts;
        }
        if other.net.retry_backoff_ms.is_some() {
            self.net.retry_backoff_ms = other.net.retry_backoff_ms;
        }

        // Resolve settings
        if other.resolve.max_concurrency.is_some() {
            self.resolve.max_concurrency = other.resolve.max_concurrency;
        }
        if other.resolve.cache_dir.is_some() {
            self.resolve.cache_dir = other.resolve.cache_dir;
        }
        if other.resolve.strict {
            self.resolve.strict = true;
        }

        // Registries with the same name are replaced
        for entry in other.registries {
            self.registries.retain(|r| r.name != entry.name);
            self.registries.push(entry);
        }
    }
}

/// Get the global dockyard config directory (~/.dockyard).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".dockyard"))
}

/// Get the global config path (~/.dockyard/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.dockyard/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".dockyard").join("config.toml")
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.dockyard/config.toml)
/// 2. Global config (~/.dockyard/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    config.merge(Config::load_or_default(project_path));

    config
}
