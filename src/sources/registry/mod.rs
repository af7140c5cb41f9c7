//! Registry resolver - bare package names looked up in a registry.
//!
//! The registry only maps a name to a real source locator. Listing and
//! fetching are delegated to the resolver that handles that locator, so a
//! registry entry can point at a git remote, a tarball, or a local path.
//!
//! Lookups are memoized for the run and persisted in the cache, so an
//! offline run can still reconstruct where a cached package came from.

mod client;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::core::validate::validate_package_name;
use crate::core::{Candidate, EndpointDeclaration, PackageMeta, Signature};
use crate::resolver::ResolveError;
use crate::sources::dispatch::classify;
use crate::sources::{FetchContext, PackageCache, Resolver, ResolverKind};

pub use client::{HttpRegistryClient, RegistryClient, RegistryRecord};

/// Cache namespace holding persisted registry records.
const RECORDS: &str = "registry";

/// A resolver for bare registry names.
pub struct RegistryResolver {
    client: Box<dyn RegistryClient>,

    /// Resolvers a registry record may point at
    delegates: Vec<Arc<dyn Resolver>>,

    /// Records already looked up this run
    records: Mutex<HashMap<String, RegistryRecord>>,

    /// Where records are persisted between runs
    store: Option<PackageCache>,
}

impl RegistryResolver {
    pub fn new(client: Box<dyn RegistryClient>, delegates: Vec<Arc<dyn Resolver>>) -> Self {
        RegistryResolver {
            client,
            delegates,
            records: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Persist lookups in `cache`.
    pub fn with_store(mut self, cache: PackageCache) -> Self {
        self.store = Some(cache);
        self
    }

    fn memoized(&self, name: &str) -> Option<RegistryRecord> {
        let records = self.records.lock().expect("registry records lock poisoned");
        records.get(name).cloned()
    }

    fn remember(&self, record: &RegistryRecord) {
        let mut records = self.records.lock().expect("registry records lock poisoned");
        records.insert(record.name.clone(), record.clone());
    }

    fn persisted(&self, name: &str) -> Option<RegistryRecord> {
        let store = self.store.as_ref()?;
        match store.load_json::<RegistryRecord>(RECORDS, name) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("ignoring unreadable registry record for `{}`: {:#}", name, e);
                None
            }
        }
    }

    /// Look up the record for a declaration, once per run.
    fn record(&self, decl: &EndpointDeclaration, cx: &FetchContext<'_>) -> Result<RegistryRecord> {
        let name = self.normalize(&decl.source)?;

        if let Some(record) = self.memoized(&name) {
            return Ok(record);
        }

        let record = if cx.options.offline {
            match self.persisted(&name) {
                Some(record) => record,
                None => bail!(ResolveError::NetworkDisabled {
                    package: decl.name.clone(),
                    locator: decl.source.clone(),
                }),
            }
        } else {
            let record = self.client.lookup(&name, cx)?;
            tracing::debug!("registry: `{}` -> {}", name, record.url);
            if let Some(store) = &self.store {
                if let Err(e) = store.store_json(RECORDS, &name, &record) {
                    tracing::warn!("failed to persist registry record for `{}`: {:#}", name, e);
                }
            }
            record
        };

        self.remember(&record);
        Ok(record)
    }

    /// The resolver and rewritten declaration a record points at.
    fn delegate(
        &self,
        decl: &EndpointDeclaration,
        record: &RegistryRecord,
        cx: &FetchContext<'_>,
    ) -> Result<(Arc<dyn Resolver>, EndpointDeclaration)> {
        let unresolvable = || ResolveError::UnresolvableSource {
            package: decl.name.clone(),
            locator: record.url.clone(),
        };

        let kind = match classify(&record.url) {
            Some(ResolverKind::Registry) | None => bail!(unresolvable()),
            Some(kind) => kind,
        };

        let Some(resolver) = self.delegates.iter().find(|r| r.kind() == kind) else {
            bail!(unresolvable());
        };

        if let Some(tool) = resolver.required_tool() {
            if !cx.tools.has(tool) {
                bail!(ResolveError::MissingDependencyTool {
                    tool: tool.to_string(),
                    package: decl.name.clone(),
                });
            }
        }

        Ok((resolver.clone(), decl.with_source(record.url.clone())))
    }
}

impl Resolver for RegistryResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Registry
    }

    /// Known only once the record is fetched; checked per delegate.
    fn required_tool(&self) -> Option<&'static str> {
        None
    }

    fn requires_network(&self) -> bool {
        true
    }

    fn normalize(&self, source: &str) -> Result<String> {
        let name = source.trim().to_ascii_lowercase();
        if let Err(e) = validate_package_name(&name) {
            bail!(e);
        }
        Ok(name)
    }

    fn identify(&self, decl: &EndpointDeclaration) -> Result<Signature> {
        Ok(Signature::new(
            ResolverKind::Registry,
            self.normalize(&decl.source)?,
            decl.target.to_string(),
        ))
    }

    fn list_available(
        &self,
        decl: &EndpointDeclaration,
        cx: &FetchContext<'_>,
    ) -> Result<Vec<Candidate>> {
        let record = self.record(decl, cx)?;
        let (resolver, delegated) = self.delegate(decl, &record, cx)?;
        resolver.list_available(&delegated, cx)
    }

    fn fetch(
        &self,
        decl: &EndpointDeclaration,
        chosen: &Candidate,
        dest: &Path,
        cx: &FetchContext<'_>,
    ) -> Result<PackageMeta> {
        let record = self.record(decl, cx)?;
        let (resolver, delegated) = self.delegate(decl, &record, cx)?;
        resolver.fetch(&delegated, chosen, dest, cx)
    }

    fn manifest_base(&self, decl: &EndpointDeclaration, fetched: &Path) -> PathBuf {
        let Ok(name) = self.normalize(&decl.source) else {
            return fetched.to_path_buf();
        };
        let record = self.memoized(&name).or_else(|| self.persisted(&name));

        match record {
            Some(record) if classify(&record.url) != Some(ResolverKind::Registry) => {
                let kind = classify(&record.url);
                self.delegates
                    .iter()
                    .find(|r| Some(r.kind()) == kind)
                    .map(|r| r.manifest_base(&decl.with_source(record.url.clone()), fetched))
                    .unwrap_or_else(|| fetched.to_path_buf())
            }
            _ => fetched.to_path_buf(),
        }
    }
}
