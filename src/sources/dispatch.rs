//! Resolver dispatch - maps a source locator's shape to a resolver.
//!
//! Matching order (first match wins):
//! 1. Explicit type hint on the declaration
//! 2. Version-control remote (`git@host:path`, `git://`, `ssh://`, `git+`,
//!    `*.git`, or a github/gitlab/bitbucket `owner/repo` URL)
//! 3. Local filesystem path (`/`, `./`, `../`, `~/`, `file://`, `C:\`)
//! 4. Tarball or other `http(s)://` URL
//! 5. Bare package name, looked up in a registry

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use regex::Regex;

use crate::core::EndpointDeclaration;
use crate::resolver::{ResolveError, ResolveOptions};
use crate::sources::registry::HttpRegistryClient;
use crate::sources::{
    GitResolver, PackageCache, PathResolver, RegistryResolver, Resolver, ResolverKind, UrlResolver,
};

static VCS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(git\+|git://|ssh://)
        | ^[\w.-]+@[\w.-]+:
        | \.git/?$
        | ^https?://(www\.)?(github\.com|gitlab\.com|bitbucket\.org)/[^/]+/[^/]+/?$",
    )
    .expect("valid vcs pattern")
});

static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(/|\./|\.\./|~/|file://|\.$|\.\.$|[A-Za-z]:[\\/])").expect("valid path pattern")
});

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://").expect("valid url pattern"));

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("valid name pattern"));

/// Classify a locator by its shape alone.
pub fn classify(source: &str) -> Option<ResolverKind> {
    let source = source.trim();

    if VCS_PATTERN.is_match(source) {
        Some(ResolverKind::Git)
    } else if PATH_PATTERN.is_match(source) {
        Some(ResolverKind::Path)
    } else if URL_PATTERN.is_match(source) {
        Some(ResolverKind::Url)
    } else if NAME_PATTERN.is_match(source) {
        Some(ResolverKind::Registry)
    } else {
        None
    }
}

/// Lookup table of resolver variants, fixed at construction time.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: BTreeMap<ResolverKind, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        ResolverRegistry {
            resolvers: BTreeMap::new(),
        }
    }

    /// Create the production registry with all four variants.
    pub fn standard(options: &ResolveOptions) -> Self {
        let git: Arc<dyn Resolver> = Arc::new(GitResolver::new());
        let path: Arc<dyn Resolver> = Arc::new(PathResolver::new());
        let url: Arc<dyn Resolver> = Arc::new(UrlResolver::new());

        let client = HttpRegistryClient::new(options.registry_endpoints.clone());
        let registry = RegistryResolver::new(
            Box::new(client),
            vec![git.clone(), path.clone(), url.clone()],
        )
        .with_store(PackageCache::at(&options.cache_dir));

        ResolverRegistry::empty()
            .register(git)
            .register(path)
            .register(url)
            .register(Arc::new(registry))
    }

    /// Register a resolver under its own kind, replacing any previous one.
    pub fn register(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolvers.insert(resolver.kind(), resolver);
        self
    }

    /// Pick the resolver kind for a declaration.
    pub fn select(&self, decl: &EndpointDeclaration) -> Result<ResolverKind, ResolveError> {
        decl.kind_hint
            .or_else(|| classify(&decl.source))
            .ok_or_else(|| ResolveError::UnresolvableSource {
                package: decl.name.clone(),
                locator: decl.source.clone(),
            })
    }

    /// Pick the resolver for a declaration.
    pub fn resolver_for(
        &self,
        decl: &EndpointDeclaration,
    ) -> Result<&Arc<dyn Resolver>, ResolveError> {
        let kind = self.select(decl)?;
        self.resolvers
            .get(&kind)
            .ok_or_else(|| ResolveError::UnresolvableSource {
                package: decl.name.clone(),
                locator: decl.source.clone(),
            })
    }

    /// Look up a resolver by kind.
    pub fn get(&self, kind: ResolverKind) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.get(&kind)
    }

    /// External tools needed by any registered resolver.
    pub fn required_tools(&self) -> Vec<&'static str> {
        let mut tools: Vec<_> = self
            .resolvers
            .values()
            .filter_map(|r| r.required_tool())
            .collect();
        tools.sort_unstable();
        tools.dedup();
        tools
    }
}
