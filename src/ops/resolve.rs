//! Project resolution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::{EndpointDeclaration, RawManifest, ROOT};
use crate::resolver::{ResolutionManager, ResolutionTree, ResolveOptions};
use crate::sources::ResolverRegistry;
use crate::util::config::{global_config_path, load_config, project_config_path};
use crate::util::process::SystemProbe;
use crate::util::{Config, GlobalContext};

/// Command-line overrides applied on top of configuration.
#[derive(Debug, Clone, Default)]
pub struct ResolveOverrides {
    pub offline: bool,
    pub strict: bool,
    pub jobs: Option<usize>,
    pub cache_dir: Option<PathBuf>,
}

impl ResolveOverrides {
    pub fn apply(&self, options: &mut ResolveOptions) {
        options.offline |= self.offline;
        options.strict |= self.strict;
        if let Some(jobs) = self.jobs {
            options.max_concurrency = jobs;
        }
        if let Some(dir) = &self.cache_dir {
            options.cache_dir = dir.clone();
        }
    }
}

/// Load configuration for the project containing `ctx.cwd()`.
///
/// Outside a project only the global file is read.
pub fn project_config(ctx: &GlobalContext) -> Config {
    let global = global_config_path();
    match ctx.project_root() {
        Ok(root) => load_config(global.as_deref(), &project_config_path(&root)),
        Err(_) => global
            .map(|path| Config::load_or_default(&path))
            .unwrap_or_default(),
    }
}

/// Build run options from configuration and overrides.
pub fn project_options(ctx: &GlobalContext, overrides: &ResolveOverrides) -> ResolveOptions {
    let config = project_config(ctx);
    let ctx = ctx.clone().with_config_registries(&config);

    let mut options = ResolveOptions::from_config(&config, &ctx);
    options.project_root = ctx.project_root().ok();
    overrides.apply(&mut options);
    options
}

/// Declarations of a root manifest.
pub fn root_declarations(manifest_path: &Path) -> Result<Vec<EndpointDeclaration>> {
    let manifest = RawManifest::load(manifest_path)?;
    let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    Ok(manifest.declarations(ROOT, true, dir))
}

/// Resolve the project found upward from `ctx.cwd()`.
///
/// A run with failures returns an [`ErrorReport`](crate::resolver::ErrorReport)
/// as the error.
pub fn resolve_project(ctx: &GlobalContext, options: &ResolveOptions) -> Result<ResolutionTree> {
    let manifest_path = ctx.find_manifest()?;
    tracing::debug!("using manifest {}", manifest_path.display());

    let roots = root_declarations(&manifest_path)
        .with_context(|| format!("failed to load {}", manifest_path.display()))?;

    let probe = SystemProbe::new(options.project_root.clone());
    let manager = ResolutionManager::new(options, ResolverRegistry::standard(options), &probe)?;

    Ok(manager.resolve(roots)?)
}
