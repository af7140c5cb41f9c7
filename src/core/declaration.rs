//! Endpoint declarations - WHAT a package asks for.
//!
//! A declaration names one dependency, the locator it should be fetched
//! from, and the version or ref it should resolve to.

use std::fmt;

use semver::{Comparator, Op, Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::sources::ResolverKind;

/// `declared_by` value for declarations coming from the root manifest.
pub const ROOT: &str = "root";

/// What a declaration wants to resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Semantic-version range (`*` included)
    Range(VersionReq),
    /// Exact tag or branch name
    Ref(String),
    /// Commit id (7-40 hex characters)
    Commit(String),
}

impl Target {
    /// Parse a target string as it appears after `#` in a locator.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if s.is_empty() || s == "*" || s == "latest" {
            return Target::Range(VersionReq::STAR);
        }

        if looks_like_commit(s) {
            return Target::Commit(s.to_ascii_lowercase());
        }

        // A full version names that release, not its caret range
        if let Ok(version) = Version::parse(s) {
            return Target::Range(exact(&version));
        }

        match VersionReq::parse(s) {
            Ok(req) => Target::Range(req),
            Err(_) => Target::Ref(s.to_string()),
        }
    }

    /// The `*` range.
    pub fn any() -> Self {
        Target::Range(VersionReq::STAR)
    }

    /// Get the version range, if this target is one.
    pub fn as_range(&self) -> Option<&VersionReq> {
        match self {
            Target::Range(req) => Some(req),
            _ => None,
        }
    }

    /// Check if this target accepts anything.
    pub fn is_any(&self) -> bool {
        matches!(self, Target::Range(req) if *req == VersionReq::STAR)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Range(req) => write!(f, "{}", req),
            Target::Ref(r) => write!(f, "{}", r),
            Target::Commit(c) => write!(f, "{}", c),
        }
    }
}

fn exact(version: &Version) -> VersionReq {
    VersionReq {
        comparators: vec![Comparator {
            op: Op::Exact,
            major: version.major,
            minor: Some(version.minor),
            patch: Some(version.patch),
            pre: version.pre.clone(),
        }],
    }
}

/// A commit id has 7-40 hex characters and at least one letter, so plain
/// numbers keep parsing as versions.
fn looks_like_commit(s: &str) -> bool {
    (7..=40).contains(&s.len())
        && s.chars().all(|c| c.is_ascii_hexdigit())
        && (s.len() == 40 || s.chars().any(|c| c.is_ascii_alphabetic()))
}

/// A request to resolve one named dependency from one source locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointDeclaration {
    /// Package name
    pub name: String,

    /// Source locator: remote URL, filesystem path, bare registry name, tarball URL
    pub source: String,

    /// Version range, tag, branch or commit
    pub target: Target,

    /// Name of the declaring package, or [`ROOT`]
    pub declared_by: String,

    /// Declared by the root manifest
    pub explicit: bool,

    /// Explicit resolver type hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_hint: Option<ResolverKind>,
}

impl EndpointDeclaration {
    /// Create a root-level (explicit) declaration.
    pub fn root(name: impl Into<String>, source: impl Into<String>, target: Target) -> Self {
        EndpointDeclaration {
            name: name.into(),
            source: source.into(),
            target,
            declared_by: ROOT.to_string(),
            explicit: true,
            kind_hint: None,
        }
    }

    /// Create a transitive declaration found in `parent`'s manifest.
    pub fn transitive(
        name: impl Into<String>,
        source: impl Into<String>,
        target: Target,
        parent: impl Into<String>,
    ) -> Self {
        EndpointDeclaration {
            name: name.into(),
            source: source.into(),
            target,
            declared_by: parent.into(),
            explicit: false,
            kind_hint: None,
        }
    }

    /// Set the resolver type hint.
    pub fn with_kind_hint(mut self, kind: ResolverKind) -> Self {
        self.kind_hint = Some(kind);
        self
    }

    /// Same declaration pointing at a different locator.
    pub fn with_source(&self, source: impl Into<String>) -> Self {
        let mut decl = self.clone();
        decl.source = source.into();
        decl.kind_hint = None;
        decl
    }

    /// The `source#target` form, as used in diagnostics.
    pub fn requirement(&self) -> String {
        format!("{}#{}", self.source, self.target)
    }
}

impl fmt::Display for EndpointDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.requirement())
    }
}
