//! Fetched package metadata and the candidates a source offers.

use std::cmp::Ordering;
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::declaration::{EndpointDeclaration, Target};
use crate::resolver::version::parse_version_lenient;

/// How a candidate ref was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Tag,
    Branch,
    Commit,
    /// Current contents of a local directory
    Snapshot,
    /// A downloadable archive or file
    Archive,
}

/// One version or ref a resolver can fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    /// Tag name, branch name, commit id, or URL
    pub reference: String,

    /// Version the reference maps to, when it has one
    pub version: Option<Version>,

    /// Commit id (or content fingerprint) the reference currently points at
    pub commit: Option<String>,

    pub kind: CandidateKind,
}

impl Candidate {
    /// A tag; its version is derived leniently from the name (`v1.2` is 1.2.0).
    pub fn tag(name: impl Into<String>, commit: Option<String>) -> Self {
        let reference = name.into();
        Candidate {
            version: parse_version_lenient(&reference),
            reference,
            commit,
            kind: CandidateKind::Tag,
        }
    }

    pub fn branch(name: impl Into<String>, commit: Option<String>) -> Self {
        Candidate {
            reference: name.into(),
            version: None,
            commit,
            kind: CandidateKind::Branch,
        }
    }

    pub fn commit(id: impl Into<String>) -> Self {
        let id = id.into();
        Candidate {
            reference: id.clone(),
            version: None,
            commit: Some(id),
            kind: CandidateKind::Commit,
        }
    }

    pub fn snapshot(version: Option<Version>, fingerprint: impl Into<String>) -> Self {
        let reference = version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "local".to_string());
        Candidate {
            reference,
            version,
            commit: Some(fingerprint.into()),
            kind: CandidateKind::Snapshot,
        }
    }

    pub fn archive(url: impl Into<String>) -> Self {
        Candidate {
            reference: url.into(),
            version: None,
            commit: None,
            kind: CandidateKind::Archive,
        }
    }

    /// Refs that can move must be revalidated on every run.
    pub fn is_mutable(&self) -> bool {
        matches!(self.kind, CandidateKind::Branch | CandidateKind::Snapshot)
    }

    /// Check if this candidate satisfies a declaration target.
    pub fn satisfies(&self, target: &Target) -> bool {
        match target {
            Target::Range(req) => {
                if target.is_any() {
                    return true;
                }
                self.version.as_ref().is_some_and(|v| req.matches(v))
            }
            Target::Ref(r) => {
                if self.reference == *r {
                    return true;
                }
                match (parse_version_lenient(r), &self.version) {
                    (Some(wanted), Some(have)) => self.kind == CandidateKind::Tag && wanted == *have,
                    _ => false,
                }
            }
            Target::Commit(c) => self
                .commit
                .as_deref()
                .is_some_and(|id| id.starts_with(c.as_str())),
        }
    }

    /// Human-readable version or ref.
    pub fn display_version(&self) -> String {
        match &self.version {
            Some(v) => v.to_string(),
            None => self.reference.clone(),
        }
    }
}

/// Order candidates by precedence: versioned candidates first, highest
/// version first; then the default branch; then everything else by name.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| match (&a.version, &b.version) {
        (Some(va), Some(vb)) => vb.cmp(va).then_with(|| a.reference.cmp(&b.reference)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => {
            let a_head = a.reference == "HEAD";
            let b_head = b.reference == "HEAD";
            b_head.cmp(&a_head).then_with(|| a.reference.cmp(&b.reference))
        }
    });
}

/// Metadata of one fetched package. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub name: String,

    pub resolved_version: Option<Version>,

    /// Tag, branch, commit or URL the package was fetched at
    pub resolved_ref: String,

    /// Where the fetched package lives on disk
    pub source_path: PathBuf,

    /// Declarations found in the package's manifest
    pub dependencies: Vec<EndpointDeclaration>,
}

impl PackageMeta {
    pub fn display_version(&self) -> String {
        match &self.resolved_version {
            Some(v) => v.to_string(),
            None => self.resolved_ref.clone(),
        }
    }
}
