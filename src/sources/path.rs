//! Path resolver - local filesystem dependencies.
//!
//! A local directory has exactly one candidate: its current contents.
//! The candidate is mutable, so the content fingerprint decides whether
//! a cached copy is still good.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use url::Url;

use crate::core::manifest::{find_manifest, read_package_meta, RawManifest};
use crate::core::{Candidate, EndpointDeclaration, PackageMeta, Signature};
use crate::resolver::version::parse_version_lenient;
use crate::resolver::ResolveError;
use crate::sources::{FetchContext, Resolver, ResolverKind};
use crate::util::fs::{copy_dir_all, normalize_path};
use crate::util::hash::fingerprint_dir;

/// Entries never copied out of a local package.
const SKIP: &[&str] = &[".git", ".dockyard"];

/// A resolver for local path dependencies.
#[derive(Debug, Default)]
pub struct PathResolver;

impl PathResolver {
    pub fn new() -> Self {
        PathResolver
    }

    fn existing_dir(&self, decl: &EndpointDeclaration) -> Result<PathBuf> {
        let path = PathBuf::from(self.normalize(&decl.source)?);
        if !path.is_dir() {
            return Err(ResolveError::FetchFailure {
                package: decl.name.clone(),
                locator: decl.source.clone(),
                attempts: 1,
                message: format!("path does not exist: {}", path.display()),
            }
            .into());
        }
        Ok(path)
    }
}

impl Resolver for PathResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Path
    }

    fn required_tool(&self) -> Option<&'static str> {
        None
    }

    fn requires_network(&self) -> bool {
        false
    }

    fn normalize(&self, source: &str) -> Result<String> {
        let source = source.trim();

        let path = if source.starts_with("file://") {
            let url = Url::parse(source).with_context(|| format!("invalid file URL: {}", source))?;
            match url.to_file_path() {
                Ok(path) => path,
                Err(()) => bail!("not a local file URL: {}", source),
            }
        } else if let Some(rest) = source.strip_prefix("~/") {
            let Some(dirs) = BaseDirs::new() else {
                bail!("cannot expand `~`: home directory unknown");
            };
            dirs.home_dir().join(rest)
        } else {
            PathBuf::from(source)
        };

        Ok(normalize_path(&path).display().to_string())
    }

    fn identify(&self, decl: &EndpointDeclaration) -> Result<Signature> {
        Ok(Signature::new(
            ResolverKind::Path,
            self.normalize(&decl.source)?,
            decl.target.to_string(),
        ))
    }

    fn list_available(
        &self,
        decl: &EndpointDeclaration,
        _cx: &FetchContext<'_>,
    ) -> Result<Vec<Candidate>> {
        let dir = self.existing_dir(decl)?;

        let version = match find_manifest(&dir) {
            Some(path) => RawManifest::load(&path)?
                .version()
                .and_then(parse_version_lenient),
            None => None,
        };

        let fingerprint = fingerprint_dir(&dir, SKIP)?;
        tracing::debug!("{} fingerprint {}", dir.display(), fingerprint);

        Ok(vec![Candidate::snapshot(version, fingerprint)])
    }

    fn fetch(
        &self,
        decl: &EndpointDeclaration,
        chosen: &Candidate,
        dest: &Path,
        _cx: &FetchContext<'_>,
    ) -> Result<PackageMeta> {
        let dir = self.existing_dir(decl)?;
        tracing::info!("Copying {}", dir.display());

        copy_dir_all(&dir, dest, SKIP)?;

        let fingerprint = fingerprint_dir(dest, SKIP)?;
        read_package_meta(dest, &dir, decl, chosen, fingerprint)
    }

    /// Relative paths inside a local package are relative to the original
    /// directory, not to the cached copy.
    fn manifest_base(&self, decl: &EndpointDeclaration, fetched: &Path) -> PathBuf {
        self.normalize(&decl.source)
            .map(PathBuf::from)
            .unwrap_or_else(|_| fetched.to_path_buf())
    }
}
