//! Global context for Dockyard operations.
//!
//! Provides centralized access to configuration, paths, and environment.
//!
//! ## Multi-Registry Support
//!
//! Dockyard supports multiple registries with priority-based resolution.
//! Bare package names are looked up in priority order (lower number =
//! higher priority); the first registry that knows the name wins.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::manifest::find_manifest as find_manifest_in;
use crate::util::config::Config;
use crate::util::diagnostic::hints;

/// Default registry endpoint.
///
/// Used when a dependency is a bare name (e.g., `zlib = "^1.3"`)
/// and no other registry is configured.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.dockyard.dev/api";

/// A configured package registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Human-readable registry name (e.g., "internal", "default")
    pub name: String,

    /// Base URL of the registry API
    pub url: String,

    /// Priority for resolution (lower = higher priority)
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Whether this registry is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_priority() -> i32 {
    100
}

fn default_enabled() -> bool {
    true
}

impl RegistryEntry {
    /// Create a new registry entry.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        RegistryEntry {
            name: name.into(),
            url: url.into(),
            priority: default_priority(),
            enabled: true,
        }
    }

    /// Create a registry entry with a specific priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark this registry as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// List of configured registries, kept sorted by priority.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryList {
    #[serde(default)]
    pub registries: Vec<RegistryEntry>,
}

impl RegistryList {
    /// Create a new empty registry list.
    pub fn new() -> Self {
        RegistryList {
            registries: Vec::new(),
        }
    }

    /// Create a registry list with the default registry.
    pub fn with_defaults() -> Self {
        RegistryList {
            registries: vec![RegistryEntry::new("default", DEFAULT_REGISTRY_URL)],
        }
    }

    /// Add a registry, replacing one with the same name.
    pub fn add(&mut self, entry: RegistryEntry) {
        self.registries.retain(|r| r.name != entry.name);
        self.registries.push(entry);
        // Stable sort: equal priorities keep insertion order
        self.registries.sort_by_key(|r| r.priority);
    }

    /// Get enabled registries in priority order.
    pub fn enabled(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.registries.iter().filter(|r| r.enabled)
    }

    /// Find a registry by name.
    pub fn by_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.registries.iter().find(|r| r.name == name)
    }

    /// Endpoint URLs of enabled registries, in priority order.
    ///
    /// Entries whose URL does not parse are skipped with a warning.
    pub fn endpoints(&self) -> Vec<Url> {
        self.enabled()
            .filter_map(|r| match Url::parse(&r.url) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!("ignoring registry `{}`: invalid URL {}: {}", r.name, r.url, e);
                    None
                }
            })
            .collect()
    }
}

/// Project directories for Dockyard
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("dev", "dockyard", "dockyard"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Directory for global Dockyard data
    home: PathBuf,

    /// Configured registries
    registries: RegistryList,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        let home = match PROJECT_DIRS.as_ref() {
            Some(dirs) => dirs.cache_dir().to_path_buf(),
            None => BaseDirs::new()
                .map(|b| b.home_dir().join(".dockyard"))
                .unwrap_or_else(|| PathBuf::from(".dockyard")),
        };

        GlobalContext {
            cwd,
            home,
            registries: RegistryList::with_defaults(),
        }
    }

    /// Add the registries named in a config.
    pub fn with_config_registries(mut self, config: &Config) -> Self {
        for entry in &config.registries {
            self.registries.add(entry.clone());
        }
        self
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the Dockyard home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the default package cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Get the configured registries.
    pub fn registries(&self) -> &RegistryList {
        &self.registries
    }

    /// Find the manifest file starting from cwd and searching upward.
    pub fn find_manifest(&self) -> Result<PathBuf> {
        let mut current = self.cwd.clone();
        loop {
            if let Some(path) = find_manifest_in(&current) {
                return Ok(path);
            }
            if !current.pop() {
                bail!(
                    "could not find Dockyard.toml in {} or any parent directory\nhelp: {}",
                    self.cwd.display(),
                    hints::NO_MANIFEST
                );
            }
        }
    }

    /// The directory holding the project manifest.
    pub fn project_root(&self) -> Result<PathBuf> {
        let manifest = self.find_manifest()?;
        Ok(manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cwd.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_paths() {
        let ctx = GlobalContext::new().unwrap();
        assert!(ctx.cwd().is_absolute());
        assert!(ctx.home().to_string_lossy().contains("dockyard"));
        assert!(ctx.cache_dir().starts_with(ctx.home()));
    }

    #[test]
    fn test_find_manifest_upward() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join("Dockyard.toml");
        std::fs::write(&manifest, "[package]\nname = \"test\"\nversion = \"0.1.0\"\n").unwrap();
        let nested = tmp.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = GlobalContext::with_cwd(nested);
        assert_eq!(ctx.find_manifest().unwrap(), manifest);
        assert_eq!(ctx.project_root().unwrap(), tmp.path());
    }

    #[test]
    fn test_find_manifest_missing() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf());
        // A Dockyard.toml above the temp dir would defeat this test
        if let Err(e) = ctx.find_manifest() {
            assert!(e.to_string().contains("could not find Dockyard.toml"));
        }
    }

    #[test]
    fn test_registry_list_priority_sorting() {
        let mut list = RegistryList::new();
        list.add(RegistryEntry::new("low", "https://low.example").with_priority(200));
        list.add(RegistryEntry::new("high", "https://high.example").with_priority(10));
        list.add(RegistryEntry::new("mid", "https://mid.example").with_priority(50));

        let names: Vec<_> = list.registries.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_registry_endpoints() {
        let mut list = RegistryList::new();
        list.add(RegistryEntry::new("a", "https://a.example/api").with_priority(20));
        list.add(RegistryEntry::new("b", "https://b.example/api").with_priority(10));
        list.add(RegistryEntry::new("off", "https://off.example").disabled());
        list.add(RegistryEntry::new("broken", "not a url"));

        let endpoints: Vec<_> = list.endpoints().iter().map(|u| u.to_string()).collect();
        assert_eq!(
            endpoints,
            vec!["https://b.example/api", "https://a.example/api"]
        );
    }

    #[test]
    fn test_config_registries_override_default() {
        let mut config = Config::default();
        config
            .registries
            .push(RegistryEntry::new("default", "https://mirror.example/api"));

        let ctx = GlobalContext::with_cwd(PathBuf::from("/")).with_config_registries(&config);
        assert_eq!(ctx.registries().registries.len(), 1);
        assert_eq!(
            ctx.registries().by_name("default").unwrap().url,
            "https://mirror.example/api"
        );
    }
}
