//! Test doubles for Dockyard unit tests.
//!
//! [`FixtureResolver`] serves in-memory packages through the regular
//! [`Resolver`](crate::sources::Resolver) interface and counts every call,
//! so tests can assert how often the manager listed or fetched a source.
//! [`StaticProbe`] answers tool probes from a fixed list.
//!
//! # Example
//!
//! ```rust,ignore
//! let fixture = Arc::new(
//!     FixtureResolver::new()
//!         .tag(A, "a", "1.0.0", &[])
//!         .tag(B, "b", "1.0.0", &[("a", "git@fixtures:a.git#^1.0")]),
//! );
//! let registry = ResolverRegistry::empty().register(fixture.clone());
//! let manager = ResolutionManager::new(&options, registry, &StaticProbe::with(&["git"]))?;
//! ```

pub mod fixtures;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::core::manifest::read_package_meta;
use crate::core::{Candidate, EndpointDeclaration, PackageMeta, Signature, MANIFEST_NAME};
use crate::resolver::ResolveError;
use crate::sources::{FetchContext, Resolver, ResolverKind};
use crate::util::process::ToolProbe;

pub use fixtures::*;

/// One ref of a fixture repository.
#[derive(Debug, Clone)]
struct FixtureRef {
    candidate: Candidate,
    name: String,
    version: String,
    deps: Vec<(String, String)>,
}

/// Counters for one fixture source.
#[derive(Debug, Default)]
struct Calls {
    lists: usize,
    fetches: usize,
    fail_budget: usize,
}

/// In-memory resolver registered in place of a real variant.
pub struct FixtureResolver {
    kind: ResolverKind,
    tool: Option<&'static str>,
    network: bool,
    repos: Mutex<BTreeMap<String, Vec<FixtureRef>>>,
    calls: Mutex<HashMap<String, Calls>>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FixtureResolver {
    /// A git-like variant that needs `git` and the network.
    pub fn new() -> Self {
        FixtureResolver {
            kind: ResolverKind::Git,
            tool: Some("git"),
            network: true,
            repos: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Register under another kind, without a tool requirement.
    pub fn with_kind(mut self, kind: ResolverKind) -> Self {
        self.kind = kind;
        self.tool = None;
        self
    }

    /// Make every fetch take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Add a tag. `deps` are `(name, locator)` pairs written to the manifest.
    pub fn tag(self, source: &str, name: &str, version: &str, deps: &[(&str, &str)]) -> Self {
        let commit = fake_commit(source, version);
        self.add(source, Candidate::tag(version, Some(commit)), name, version, deps)
    }

    /// Add a branch pointing at `commit`.
    pub fn branch(
        self,
        source: &str,
        name: &str,
        branch: &str,
        commit: &str,
        deps: &[(&str, &str)],
    ) -> Self {
        self.add(
            source,
            Candidate::branch(branch, Some(commit.to_string())),
            name,
            "0.0.0",
            deps,
        )
    }

    fn add(
        self,
        source: &str,
        candidate: Candidate,
        name: &str,
        version: &str,
        deps: &[(&str, &str)],
    ) -> Self {
        let fixture_ref = FixtureRef {
            candidate,
            name: name.to_string(),
            version: version.to_string(),
            deps: deps
                .iter()
                .map(|(n, l)| (n.to_string(), l.to_string()))
                .collect(),
        };
        self.repos
            .lock()
            .unwrap()
            .entry(source.to_string())
            .or_default()
            .push(fixture_ref);
        self
    }

    /// Point an existing branch at a new commit.
    pub fn move_branch(&self, source: &str, branch: &str, commit: &str) {
        let mut repos = self.repos.lock().unwrap();
        let refs = repos.get_mut(source).expect("unknown fixture source");
        for r in refs.iter_mut() {
            if r.candidate.reference == branch {
                r.candidate.commit = Some(commit.to_string());
            }
        }
    }

    /// Fail the next `times` fetches of `source` with a transient error.
    pub fn fail_fetches(&self, source: &str, times: usize) {
        self.calls
            .lock()
            .unwrap()
            .entry(source.to_string())
            .or_default()
            .fail_budget = times;
    }

    pub fn list_calls(&self) -> usize {
        self.calls.lock().unwrap().values().map(|c| c.lists).sum()
    }

    pub fn fetch_calls(&self) -> usize {
        self.calls.lock().unwrap().values().map(|c| c.fetches).sum()
    }

    pub fn fetches_of(&self, source: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(source)
            .map(|c| c.fetches)
            .unwrap_or(0)
    }

    /// Highest number of fetches that ran at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn refs(&self, decl: &EndpointDeclaration) -> Result<Vec<FixtureRef>> {
        let source = self.normalize(&decl.source)?;
        match self.repos.lock().unwrap().get(&source) {
            Some(refs) => Ok(refs.clone()),
            None => bail!(ResolveError::UnresolvableSource {
                package: decl.name.clone(),
                locator: decl.source.clone(),
            }),
        }
    }
}

impl Default for FixtureResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for FixtureResolver {
    fn kind(&self) -> ResolverKind {
        self.kind
    }

    fn required_tool(&self) -> Option<&'static str> {
        self.tool
    }

    fn requires_network(&self) -> bool {
        self.network
    }

    fn normalize(&self, source: &str) -> Result<String> {
        Ok(source.trim().to_string())
    }

    fn identify(&self, decl: &EndpointDeclaration) -> Result<Signature> {
        Ok(Signature::new(
            self.kind,
            self.normalize(&decl.source)?,
            decl.target.to_string(),
        ))
    }

    fn list_available(
        &self,
        decl: &EndpointDeclaration,
        _cx: &FetchContext<'_>,
    ) -> Result<Vec<Candidate>> {
        let source = self.normalize(&decl.source)?;
        self.calls.lock().unwrap().entry(source).or_default().lists += 1;
        Ok(self.refs(decl)?.into_iter().map(|r| r.candidate).collect())
    }

    fn fetch(
        &self,
        decl: &EndpointDeclaration,
        chosen: &Candidate,
        dest: &Path,
        _cx: &FetchContext<'_>,
    ) -> Result<PackageMeta> {
        let source = self.normalize(&decl.source)?;
        {
            let mut calls = self.calls.lock().unwrap();
            let calls = calls.entry(source.clone()).or_default();
            calls.fetches += 1;
            if calls.fail_budget > 0 {
                calls.fail_budget -= 1;
                bail!("connection reset by peer");
            }
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let refs = self.refs(decl)?;
        let Some(found) = refs.iter().find(|r| {
            r.candidate.reference == chosen.reference
                || (chosen.commit.is_some() && r.candidate.commit == chosen.commit)
        }) else {
            bail!("ref {} not found in {}", chosen.reference, source);
        };

        std::fs::write(dest.join(MANIFEST_NAME), render_manifest(found))?;

        let resolved_ref = found
            .candidate
            .commit
            .clone()
            .unwrap_or_else(|| found.candidate.reference.clone());
        read_package_meta(dest, dest, decl, chosen, resolved_ref)
    }

    fn manifest_base(&self, _decl: &EndpointDeclaration, fetched: &Path) -> PathBuf {
        fetched.to_path_buf()
    }
}

fn render_manifest(r: &FixtureRef) -> String {
    let mut out = format!(
        "[package]\nname = \"{}\"\nversion = \"{}\"\n",
        r.name, r.version
    );
    if !r.deps.is_empty() {
        out.push_str("\n[dependencies]\n");
        for (name, locator) in &r.deps {
            out.push_str(&format!("{} = \"{}\"\n", name, locator));
        }
    }
    out
}

fn fake_commit(source: &str, version: &str) -> String {
    crate::util::hash::sha256_str(&format!("{}#{}", source, version))[..40].to_string()
}

/// Tool probe answering from a fixed list, counting queries.
#[derive(Debug, Default)]
pub struct StaticProbe {
    tools: Vec<String>,
    queries: AtomicUsize,
}

impl StaticProbe {
    pub fn with(tools: &[&str]) -> Self {
        StaticProbe {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn none() -> Self {
        StaticProbe::default()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl ToolProbe for StaticProbe {
    fn has_tool(&self, name: &str) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.tools.iter().any(|t| t == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Target;
    use crate::resolver::ResolveOptions;
    use crate::util::process::ToolSet;
    use tempfile::TempDir;

    const A: &str = "git@fixtures:a.git";

    #[test]
    fn test_fixture_lists_and_fetches() {
        let tmp = TempDir::new().unwrap();
        let fixture = FixtureResolver::new()
            .tag(A, "a", "1.0.0", &[])
            .tag(A, "a", "1.1.0", &[("b", "git@fixtures:b.git#^2")]);

        let options = ResolveOptions::new(tmp.path().join("cache"));
        let tools = ToolSet::default();
        let cx = FetchContext {
            options: &options,
            tools: &tools,
        };
        let decl = EndpointDeclaration::root("a", A, Target::any());

        let candidates = fixture.list_available(&decl, &cx).unwrap();
        assert_eq!(candidates.len(), 2);

        let dest = tmp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        let meta = fixture.fetch(&decl, &candidates[1], &dest, &cx).unwrap();

        assert_eq!(meta.dependencies.len(), 1);
        assert_eq!(meta.dependencies[0].source, "git@fixtures:b.git");
        assert_eq!((fixture.list_calls(), fixture.fetch_calls()), (1, 1));
    }

    #[test]
    fn test_static_probe() {
        let probe = StaticProbe::with(&["git"]);
        assert!(probe.has_tool("git"));
        assert!(!probe.has_tool("svn"));
        assert_eq!(probe.queries(), 2);
        assert!(!StaticProbe::none().has_tool("git"));
    }
}
