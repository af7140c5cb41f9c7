//! Resolver trait - common interface for all package sources.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::core::{Candidate, EndpointDeclaration, PackageMeta, Signature};
use crate::resolver::ResolveOptions;
use crate::util::process::ToolSet;

/// The resolver variants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// Version-control remote
    Git,
    /// Local filesystem path
    Path,
    /// Tarball or file URL
    Url,
    /// Bare name looked up in a registry
    Registry,
}

impl ResolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolverKind::Git => "git",
            ResolverKind::Path => "path",
            ResolverKind::Url => "url",
            ResolverKind::Registry => "registry",
        }
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolverKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "git" => Ok(ResolverKind::Git),
            "path" => Ok(ResolverKind::Path),
            "url" => Ok(ResolverKind::Url),
            "registry" => Ok(ResolverKind::Registry),
            _ => bail!("unknown resolver kind: {}", s),
        }
    }
}

/// Run-wide state handed to every resolver call.
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    pub options: &'a ResolveOptions,
    pub tools: &'a ToolSet,
}

/// A strategy that turns a declaration into fetched package metadata.
///
/// Typed failures are raised as [`crate::resolver::ResolveError`] through
/// `anyhow`; anything else is treated as a transient fetch failure.
pub trait Resolver: Send + Sync {
    /// The variant this resolver implements.
    fn kind(&self) -> ResolverKind;

    /// External executable this resolver needs, if any.
    fn required_tool(&self) -> Option<&'static str>;

    /// Whether listing and fetching need network access.
    fn requires_network(&self) -> bool;

    /// Canonical form of a source locator.
    fn normalize(&self, source: &str) -> Result<String>;

    /// Deterministic, side-effect-free signature of a declaration.
    fn identify(&self, decl: &EndpointDeclaration) -> Result<Signature>;

    /// Enumerate the versions and refs the source offers.
    fn list_available(
        &self,
        decl: &EndpointDeclaration,
        cx: &FetchContext<'_>,
    ) -> Result<Vec<Candidate>>;

    /// Fetch `chosen` into the empty directory `dest` and parse its
    /// manifest.
    fn fetch(
        &self,
        decl: &EndpointDeclaration,
        chosen: &Candidate,
        dest: &Path,
        cx: &FetchContext<'_>,
    ) -> Result<PackageMeta>;

    /// Directory that relative paths in the fetched manifest refer to.
    fn manifest_base(&self, decl: &EndpointDeclaration, fetched: &Path) -> PathBuf;
}
