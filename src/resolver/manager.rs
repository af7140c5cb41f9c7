//! The resolution manager.
//!
//! Declarations are processed in breadth-first levels. For each level:
//!
//! 1. Declarations are grouped by package name. A name already resolved at
//!    an earlier level is reconciled against its selection instead.
//! 2. Each group goes to the [`ConflictResolver`] together with the
//!    candidates its primary source lists. Listings are shared per source.
//! 3. Selected candidates are fetched on the worker pool, or served from
//!    the cache. Fetches are shared per [`Signature`].
//! 4. Fetched manifests are validated, and their declarations form the
//!    next level.
//!
//! A failure aborts only the subtree below the failing package. The run
//! keeps going and reports every failure together in an [`ErrorReport`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::thread;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::core::manifest::{load_manifest_in, package_meta};
use crate::core::{
    Candidate, DefaultValidator, EndpointDeclaration, ManifestValidator, PackageMeta, Signature,
    ROOT,
};
use crate::resolver::conflict::{ConflictResolver, ConflictSet, Selection};
use crate::resolver::inflight::InFlight;
use crate::resolver::report::{ErrorReport, Failure, ResolutionTree, ResolvedPackage, Warning};
use crate::resolver::{ResolveError, ResolveOptions};
use crate::sources::{CacheEntry, FetchContext, PackageCache, Resolver, ResolverRegistry};
use crate::util::process::{ToolProbe, ToolSet};

/// A package on disk, ready to be folded into the tree.
#[derive(Debug, Clone)]
struct Fetched {
    meta: PackageMeta,
    signature: Signature,
    warnings: Vec<Warning>,
}

/// Dedup tables shared by all levels of one run.
#[derive(Default)]
struct Shared {
    listings: InFlight<String, Result<Vec<Candidate>, ResolveError>>,
    fetches: InFlight<Signature, Result<Fetched, ResolveError>>,
}

/// Bookkeeping for one run.
#[derive(Default)]
struct RunState {
    roots: Vec<String>,
    selections: HashMap<String, Selection>,
    packages: BTreeMap<String, ResolvedPackage>,
    /// Declaring parents of each name, from the root down
    chains: HashMap<String, Vec<String>>,
    /// Names whose subtree was aborted
    failed: HashSet<String>,
    failures: Vec<Failure>,
    warnings: Vec<Warning>,
}

impl RunState {
    fn chain_for(&self, decl: &EndpointDeclaration) -> Vec<String> {
        if decl.declared_by == ROOT {
            return vec![ROOT.to_string()];
        }
        let mut chain = self
            .chains
            .get(&decl.declared_by)
            .cloned()
            .unwrap_or_else(|| vec![ROOT.to_string()]);
        chain.push(decl.declared_by.clone());
        chain
    }

    fn report(&mut self, decl: &EndpointDeclaration, error: ResolveError) {
        tracing::debug!("{}: {}", decl, error);
        let chain = self.chain_for(decl);
        self.failures.push(Failure {
            package: decl.name.clone(),
            chain,
            error,
        });
    }

    /// Record a failure and stop recursing below `decl.name`.
    fn fail(&mut self, decl: &EndpointDeclaration, error: ResolveError) {
        self.failed.insert(decl.name.clone());
        self.report(decl, error);
    }
}

/// Orchestrates resolvers, the cache and the conflict resolver.
pub struct ResolutionManager {
    options: ResolveOptions,
    registry: ResolverRegistry,
    tools: ToolSet,
    cache: PackageCache,
    validator: Box<dyn ManifestValidator>,
    conflicts: ConflictResolver,
    pool: rayon::ThreadPool,
}

impl ResolutionManager {
    /// Create a manager. Tools needed by the registered resolvers are
    /// probed once, here.
    pub fn new(
        options: &ResolveOptions,
        registry: ResolverRegistry,
        probe: &dyn ToolProbe,
    ) -> Result<Self> {
        if options.max_concurrency == 0 {
            bail!("max-concurrency must be greater than zero");
        }

        let tools = ToolSet::probe(probe, registry.required_tools());
        let cache = PackageCache::open(&options.cache_dir).with_context(|| {
            format!("failed to open cache at {}", options.cache_dir.display())
        })?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_concurrency)
            .thread_name(|i| format!("dockyard-fetch-{}", i))
            .build()
            .context("failed to start fetch pool")?;

        Ok(ResolutionManager {
            options: options.clone(),
            registry,
            tools,
            cache,
            validator: Box::new(DefaultValidator),
            conflicts: ConflictResolver::new(),
            pool,
        })
    }

    /// Replace the manifest validator.
    pub fn with_validator(mut self, validator: Box<dyn ManifestValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn cache(&self) -> &PackageCache {
        &self.cache
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    fn context(&self) -> FetchContext<'_> {
        FetchContext {
            options: &self.options,
            tools: &self.tools,
        }
    }

    /// Resolve root declarations into a tree, or report every failure.
    pub fn resolve(
        &self,
        roots: Vec<EndpointDeclaration>,
    ) -> Result<ResolutionTree, ErrorReport> {
        let shared = Shared::default();
        let mut state = RunState::default();

        for decl in &roots {
            if !state.roots.contains(&decl.name) {
                state.roots.push(decl.name.clone());
            }
        }

        let mut frontier = roots;
        let mut depth = 0usize;

        while !frontier.is_empty() {
            tracing::debug!("level {}: {} declaration(s)", depth, frontier.len());
            let sets = self.collect(&mut state, std::mem::take(&mut frontier));

            let selected: Vec<(ConflictSet, Result<Selection, ResolveError>)> =
                self.pool.install(|| {
                    sets.into_par_iter()
                        .map(|set| {
                            let result = self.select(&set, &shared);
                            (set, result)
                        })
                        .collect()
                });

            let mut chosen = Vec::new();
            for (set, result) in selected {
                match (result, set.primary()) {
                    (Ok(selection), _) => chosen.push(selection),
                    (Err(e), Some(primary)) => state.fail(primary, e),
                    (Err(_), None) => {}
                }
            }

            let fetched: Vec<(Selection, Result<Fetched, ResolveError>, bool)> =
                self.pool.install(|| {
                    chosen
                        .into_par_iter()
                        .map(|selection| {
                            let (result, owner) = self.fetch(&selection, &shared);
                            (selection, result, owner)
                        })
                        .collect()
                });

            for (selection, result, owner) in fetched {
                match result {
                    Ok(fetched) => frontier.extend(self.fold(&mut state, selection, fetched, owner)),
                    Err(e) => state.fail(&selection.decl, e),
                }
            }

            depth += 1;
        }

        let tree = ResolutionTree {
            roots: state.roots,
            packages: state.packages,
            warnings: state.warnings.clone(),
        };

        if state.failures.is_empty() {
            tracing::info!("Resolved {} package(s)", tree.len());
            Ok(tree)
        } else {
            Err(ErrorReport {
                failures: state.failures,
                warnings: state.warnings,
                partial: tree,
            })
        }
    }

    /// Group a level's declarations by name, reconciling names resolved
    /// at earlier levels.
    fn collect(
        &self,
        state: &mut RunState,
        decls: Vec<EndpointDeclaration>,
    ) -> Vec<ConflictSet> {
        let mut sets: Vec<ConflictSet> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for decl in decls {
            if state.failed.contains(&decl.name) {
                continue;
            }

            if let Some(selection) = state.selections.get_mut(&decl.name) {
                match self.conflicts.reconcile(selection, &decl) {
                    Ok(warning) => {
                        state.warnings.extend(warning);
                        selection.declarations.push(decl.clone());
                        if let Some(pkg) = state.packages.get_mut(&decl.name) {
                            pkg.declared_by = selection.declared_by();
                        }
                    }
                    Err(e) => state.report(&decl, e),
                }
                continue;
            }

            if !state.chains.contains_key(&decl.name) {
                let chain = state.chain_for(&decl);
                state.chains.insert(decl.name.clone(), chain);
            }

            match index.get(&decl.name) {
                Some(&i) => sets[i].push(decl),
                None => {
                    index.insert(decl.name.clone(), sets.len());
                    let mut set = ConflictSet::new(decl.name.clone());
                    set.push(decl);
                    sets.push(set);
                }
            }
        }

        sets
    }

    /// Decide the candidate for one name.
    fn select(&self, set: &ConflictSet, shared: &Shared) -> Result<Selection, ResolveError> {
        let Some(primary) = set.primary() else {
            return self.conflicts.resolve(set, Vec::new());
        };

        let resolver = self.registry.resolver_for(primary)?;
        self.check_tool(resolver.as_ref(), primary)?;

        let candidates = match set.pinned_commit() {
            Some(id) => vec![Candidate::commit(id)],
            None => self.list(resolver.as_ref(), primary, shared)?,
        };

        let selection = self.conflicts.resolve(set, candidates)?;
        tracing::debug!(
            "selected {} {} ({} declaration(s))",
            set.name,
            selection.candidate.display_version(),
            set.declarations.len()
        );
        Ok(selection)
    }

    fn check_tool(
        &self,
        resolver: &dyn Resolver,
        decl: &EndpointDeclaration,
    ) -> Result<(), ResolveError> {
        match resolver.required_tool() {
            Some(tool) if !self.tools.has(tool) => Err(ResolveError::MissingDependencyTool {
                tool: tool.to_string(),
                package: decl.name.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn identify(
        &self,
        resolver: &dyn Resolver,
        decl: &EndpointDeclaration,
    ) -> Result<Signature, ResolveError> {
        resolver.identify(decl).map_err(|e| match e.downcast_ref::<ResolveError>() {
            Some(typed) => typed.clone(),
            None => {
                tracing::debug!("cannot identify {}: {:#}", decl, e);
                ResolveError::UnresolvableSource {
                    package: decl.name.clone(),
                    locator: decl.source.clone(),
                }
            }
        })
    }

    /// Candidates of a source, listed at most once per run.
    fn list(
        &self,
        resolver: &dyn Resolver,
        decl: &EndpointDeclaration,
        shared: &Shared,
    ) -> Result<Vec<Candidate>, ResolveError> {
        let key = self.identify(resolver, decl)?.listing_key();
        let (result, owner) = shared
            .listings
            .run(&key, || self.list_uncached(resolver, decl, &key));
        if !owner {
            tracing::debug!("reusing listing of {}", key);
        }
        result
    }

    fn list_uncached(
        &self,
        resolver: &dyn Resolver,
        decl: &EndpointDeclaration,
        key: &str,
    ) -> Result<Vec<Candidate>, ResolveError> {
        if self.options.offline && resolver.requires_network() {
            return match self.cache.load_refs(key) {
                Ok(Some(candidates)) => {
                    tracing::debug!("offline: using cached listing of {}", key);
                    Ok(candidates)
                }
                Ok(None) => Err(network_disabled(decl)),
                Err(e) => {
                    tracing::warn!("ignoring cached listing of {}: {:#}", key, e);
                    Err(network_disabled(decl))
                }
            };
        }

        let cx = self.context();
        let candidates = self.retry(decl, || resolver.list_available(decl, &cx))?;

        if resolver.requires_network() {
            if let Err(e) = self.cache.store_refs(key, &candidates) {
                tracing::warn!("failed to cache listing of {}: {:#}", key, e);
            }
        }
        Ok(candidates)
    }

    /// Fetch a selection, at most once per signature per run.
    ///
    /// The flag is true for the caller that did the work.
    fn fetch(&self, selection: &Selection, shared: &Shared) -> (Result<Fetched, ResolveError>, bool) {
        let resolver = match self.registry.resolver_for(&selection.decl) {
            Ok(resolver) => resolver,
            Err(e) => return (Err(e), true),
        };
        let signature = match self.identify(resolver.as_ref(), &selection.decl) {
            Ok(sig) => sig.with_target(selection.candidate.reference.clone()),
            Err(e) => return (Err(e), true),
        };

        let (result, owner) = shared.fetches.run(&signature, || {
            self.fetch_uncached(resolver.as_ref(), selection, &signature)
        });
        if !owner {
            tracing::debug!("{} already fetched this run", signature);
        }
        (result, owner)
    }

    fn fetch_uncached(
        &self,
        resolver: &dyn Resolver,
        selection: &Selection,
        sig: &Signature,
    ) -> Result<Fetched, ResolveError> {
        let decl = &selection.decl;
        let candidate = &selection.candidate;
        let offline = self.options.offline && resolver.requires_network();
        let mut warnings = Vec::new();

        let cached = self.cache.lookup(sig).unwrap_or_else(|e| {
            tracing::warn!("cache lookup for {} failed: {:#}", sig, e);
            None
        });

        let entry = match cached {
            Some(entry) if !entry.mutable => entry,
            Some(entry) if offline => {
                let warning = Warning::stale(&decl.name, sig);
                tracing::warn!("{}", warning);
                warnings.push(warning);
                entry
            }
            Some(entry) if candidate.commit.as_deref() == Some(entry.meta.resolved_ref.as_str()) => {
                tracing::debug!("{} is up to date", sig);
                entry
            }
            _ if offline => return Err(network_disabled(decl)),
            _ => {
                let cx = self.context();
                self.retry(decl, || {
                    let staging = self.cache.stage()?;
                    let meta = resolver.fetch(decl, candidate, &staging.package_dir(), &cx)?;
                    self.cache.put(staging, sig, meta, candidate.is_mutable())
                })?
            }
        };

        let (meta, problems) = self.inspect(resolver, selection, &entry)?;
        for problem in problems {
            let warning = Warning::manifest(&decl.name, problem);
            tracing::warn!("{}: {}", decl.name, warning);
            warnings.push(warning);
        }

        Ok(Fetched {
            meta,
            signature: sig.clone(),
            warnings,
        })
    }

    /// Re-read and validate the manifest of a cached package.
    fn inspect(
        &self,
        resolver: &dyn Resolver,
        selection: &Selection,
        entry: &CacheEntry,
    ) -> Result<(PackageMeta, Vec<String>), ResolveError> {
        let decl = &selection.decl;
        let base = resolver.manifest_base(decl, &entry.path);
        let manifest = load_manifest_in(&entry.path, &decl.name)?;

        let meta = package_meta(
            manifest.as_ref(),
            &entry.path,
            &base,
            decl,
            &selection.candidate,
            entry.meta.resolved_ref.clone(),
        );

        let problems = self.validator.validate(manifest.as_ref(), &meta, decl);
        if self.options.strict && !problems.is_empty() {
            return Err(ResolveError::ManifestInvalid {
                package: decl.name.clone(),
                problems,
            });
        }

        Ok((meta, problems))
    }

    /// Run `op`, retrying untyped failures with exponential backoff.
    fn retry<T>(
        &self,
        decl: &EndpointDeclaration,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T, ResolveError> {
        let mut attempt = 0;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if let Some(typed) = err.downcast_ref::<ResolveError>() {
                return Err(typed.clone());
            }

            if attempt >= self.options.retry_attempts {
                return Err(ResolveError::FetchFailure {
                    package: decl.name.clone(),
                    locator: decl.source.clone(),
                    attempts: attempt + 1,
                    message: format!("{:#}", err),
                });
            }

            let delay = self.options.backoff(attempt);
            tracing::warn!(
                "{} failed (attempt {}), retrying in {:?}: {:#}",
                decl,
                attempt + 1,
                delay,
                err
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }

    /// Add a fetched package to the tree; returns its declarations.
    fn fold(
        &self,
        state: &mut RunState,
        mut selection: Selection,
        fetched: Fetched,
        owner: bool,
    ) -> Vec<EndpointDeclaration> {
        let name = selection.decl.name.clone();
        let mut meta = fetched.meta;

        // Shared with another name that has the same signature
        if meta.name != name {
            meta.name = name.clone();
            for dep in &mut meta.dependencies {
                dep.declared_by = name.clone();
            }
        }

        state.warnings.append(&mut selection.warnings);
        if owner {
            state.warnings.extend(fetched.warnings);
        }

        tracing::info!("Resolved {} {}", name, meta.display_version());
        state.packages.insert(
            name.clone(),
            ResolvedPackage::new(&meta, fetched.signature, selection.declared_by()),
        );
        state.selections.insert(name, selection);

        meta.dependencies
    }
}

fn network_disabled(decl: &EndpointDeclaration) -> ResolveError {
    ResolveError::NetworkDisabled {
        package: decl.name.clone(),
        locator: decl.source.clone(),
    }
}
