//! Dependency resolution.
//!
//! The [`ResolutionManager`] walks the declaration graph breadth-first,
//! dispatching each declaration to a resolver, deduplicating identical
//! requests and reconciling constraints on the same name with the
//! [`ConflictResolver`]. All run-wide settings live in [`ResolveOptions`],
//! built once and passed by reference everywhere.

pub mod conflict;
pub mod errors;
pub mod inflight;
pub mod manager;
pub mod report;
pub mod version;

pub use conflict::{ConflictResolver, ConflictSet, Selection};
pub use errors::ResolveError;
pub use inflight::InFlight;
pub use manager::ResolutionManager;
pub use report::{ErrorReport, Failure, ResolutionTree, ResolvedPackage, Warning, WarningKind};

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::util::config::Config;
use crate::util::context::GlobalContext;

const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Settings for one resolution run. Fixed for the duration of the run.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Disable every network-requiring operation except cache hits
    pub offline: bool,

    /// Root of the package cache
    pub cache_dir: PathBuf,

    /// Registries for bare names, first reachable wins
    pub registry_endpoints: Vec<Url>,

    /// Size of the fetch pool; must be positive
    pub max_concurrency: usize,

    /// Per-operation timeout for subprocesses and HTTP
    pub fetch_timeout: Duration,

    /// Retries after a transient fetch failure
    pub retry_attempts: u32,

    /// Delay before the first retry, doubled per attempt
    pub retry_backoff: Duration,

    /// Escalate manifest warnings to errors
    pub strict: bool,

    /// Project whose `.dockyard/bin` is searched for tools
    pub project_root: Option<PathBuf>,
}

impl ResolveOptions {
    /// Defaults with the given cache directory.
    pub fn new(cache_dir: PathBuf) -> Self {
        ResolveOptions {
            offline: false,
            cache_dir,
            registry_endpoints: Vec::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            strict: false,
            project_root: None,
        }
    }

    /// Build options from loaded configuration.
    pub fn from_config(config: &Config, ctx: &GlobalContext) -> Self {
        let cache_dir = config
            .resolve
            .cache_dir
            .clone()
            .unwrap_or_else(|| ctx.cache_dir());

        let mut options = ResolveOptions::new(cache_dir);
        options.offline = config.net.offline;
        options.strict = config.resolve.strict;
        options.registry_endpoints = ctx.registries().endpoints();

        if let Some(jobs) = config.resolve.max_concurrency {
            options.max_concurrency = jobs;
        }
        if let Some(secs) = config.net.fetch_timeout {
            options.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = config.net.retry_attempts {
            options.retry_attempts = attempts;
        }
        if let Some(ms) = config.net.retry_backoff_ms {
            options.retry_backoff = Duration::from_millis(ms);
        }

        options
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(1u32 << attempt.min(16))
    }
}
