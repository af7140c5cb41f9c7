//! Resolution results: the resolved tree, warnings, and the error report.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::Serialize;
use thiserror::Error;

use crate::core::{PackageMeta, Signature, ROOT};
use crate::resolver::ResolveError;
use crate::util::diagnostic::Diagnostic;

/// What a warning is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// A transitive range the explicit root declaration does not satisfy
    ShadowedConstraint,
    /// A mutable entry used without revalidation because the run is offline
    StaleCache,
    /// A manifest problem reported by the validator
    ManifestInvalid,
}

/// A non-fatal finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub package: String,
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn shadowed(
        package: &str,
        requirer: &str,
        requirement: &str,
        chosen: &str,
    ) -> Self {
        Warning {
            package: package.to_string(),
            kind: WarningKind::ShadowedConstraint,
            message: format!(
                "`{}` requires {} {}, overridden by the root declaration ({})",
                requirer, package, requirement, chosen
            ),
        }
    }

    pub fn stale(package: &str, signature: &Signature) -> Self {
        Warning {
            package: package.to_string(),
            kind: WarningKind::StaleCache,
            message: format!(
                "using cached `{}` without revalidation (offline): {}",
                package, signature
            ),
        }
    }

    pub fn manifest(package: &str, problem: impl Into<String>) -> Self {
        Warning {
            package: package.to_string(),
            kind: WarningKind::ManifestInvalid,
            message: problem.into(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::warning(&self.message);
        match self.kind {
            WarningKind::StaleCache => {
                diag.with_hint("Run without `--offline` to revalidate")
            }
            WarningKind::ManifestInvalid => diag.with_detail(format!("package: {}", self.package)),
            WarningKind::ShadowedConstraint => diag,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One resolved package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPackage {
    pub name: String,

    #[serde(serialize_with = "serialize_version")]
    pub version: Option<Version>,

    /// Ref or commit the package was fetched at
    pub reference: String,

    pub path: PathBuf,

    pub signature: Signature,

    /// Names of the packages this one declares
    pub dependencies: Vec<String>,

    /// Packages that declared this one
    pub declared_by: Vec<String>,
}

impl ResolvedPackage {
    pub fn new(meta: &PackageMeta, signature: Signature, declared_by: Vec<String>) -> Self {
        let mut dependencies: Vec<String> =
            meta.dependencies.iter().map(|d| d.name.clone()).collect();
        dependencies.sort();
        dependencies.dedup();

        ResolvedPackage {
            name: meta.name.clone(),
            version: meta.resolved_version.clone(),
            reference: meta.resolved_ref.clone(),
            path: meta.source_path.clone(),
            signature,
            dependencies,
            declared_by,
        }
    }

    pub fn display_version(&self) -> String {
        match &self.version {
            Some(v) => v.to_string(),
            None => self.reference.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn serialize_version<S: serde::Serializer>(
    version: &Option<Version>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match version {
        Some(v) => serializer.serialize_some(&v.to_string()),
        None => serializer.serialize_none(),
    }
}

/// The outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionTree {
    /// Names declared by the root manifest
    pub roots: Vec<String>,

    pub packages: BTreeMap<String, ResolvedPackage>,

    pub warnings: Vec<Warning>,
}

impl ResolutionTree {
    pub fn get(&self, name: &str) -> Option<&ResolvedPackage> {
        self.packages.get(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// One `name version path` line per package.
    pub fn render(&self) -> String {
        let width = self.packages.keys().map(String::len).max().unwrap_or(0);
        let mut out = String::new();
        for pkg in self.packages.values() {
            out.push_str(&format!(
                "{:width$}  {}  {}\n",
                pkg.name,
                pkg.display_version(),
                pkg.path.display(),
                width = width
            ));
        }
        out
    }
}

/// A package that could not be resolved, and how the run got to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub package: String,

    /// Declaring parents from the root down to the direct declarer
    pub chain: Vec<String>,

    pub error: ResolveError,
}

impl Failure {
    /// Root first, the failing package last.
    pub fn chain_path(&self) -> Vec<String> {
        let mut parts = self.chain.clone();
        if parts.first().map(String::as_str) != Some(ROOT) {
            parts.insert(0, ROOT.to_string());
        }
        parts.push(self.package.clone());
        parts
    }

    /// `root -> a -> b -> pkg`
    pub fn chain_display(&self) -> String {
        self.chain_path().join(" -> ")
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        self.error.to_diagnostic().required_by(self.chain_path())
    }
}

/// Every failure of a run, reported together.
#[derive(Debug, Clone, Error)]
#[error("failed to resolve {} package(s): {}", .failures.len(), failed_names(.failures))]
pub struct ErrorReport {
    pub failures: Vec<Failure>,

    pub warnings: Vec<Warning>,

    /// Packages that did resolve
    pub partial: ResolutionTree,
}

fn failed_names(failures: &[Failure]) -> String {
    let mut names: Vec<&str> = failures.iter().map(|f| f.package.as_str()).collect();
    names.dedup();
    names.join(", ")
}

impl ErrorReport {
    /// Failure for a given package, if any.
    pub fn failure(&self, package: &str) -> Option<&Failure> {
        self.failures.iter().find(|f| f.package == package)
    }

    /// Render every failure and warning as diagnostics.
    pub fn render(&self, color: bool) -> String {
        let mut out = String::new();
        for warning in &self.warnings {
            out.push_str(&warning.to_diagnostic().format(color));
        }
        for failure in &self.failures {
            out.push_str(&failure.to_diagnostic().format(color));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ResolverKind;

    fn failure() -> Failure {
        Failure {
            package: "openssl".to_string(),
            chain: vec!["root".to_string(), "curl".to_string()],
            error: ResolveError::VersionConflict {
                package: "openssl".to_string(),
                requirements: vec![
                    ("curl".to_string(), "^3.0".to_string()),
                    ("legacy".to_string(), "^1.1".to_string()),
                ],
            },
        }
    }

    #[test]
    fn test_chain_display() {
        let mut f = failure();
        assert_eq!(f.chain_display(), "root -> curl -> openssl");
        f.chain.clear();
        assert_eq!(f.chain_display(), "root -> openssl");
    }

    #[test]
    fn test_report_render() {
        let report = ErrorReport {
            failures: vec![failure()],
            warnings: vec![Warning::manifest("zlib", "missing `package.version`")],
            partial: ResolutionTree::default(),
        };

        let out = report.render(false);
        assert!(out.contains("warning: missing `package.version`"));
        assert!(out.contains("error: version conflict for `openssl`"));
        assert!(out.contains("required by: root -> curl -> openssl"));
        let chain = out.find("required by:").unwrap();
        assert!(chain < out.find("`curl` requires openssl ^3.0").unwrap());
        assert_eq!(
            report.to_string(),
            "failed to resolve 1 package(s): openssl"
        );
        assert!(report.failure("openssl").is_some());
    }

    #[test]
    fn test_tree_render() {
        let meta = PackageMeta {
            name: "zlib".to_string(),
            resolved_version: Some(Version::new(1, 3, 0)),
            resolved_ref: "v1.3.0".to_string(),
            source_path: PathBuf::from("/cache/zlib"),
            dependencies: Vec::new(),
        };
        let sig = Signature::new(ResolverKind::Git, "https://x/zlib.git", "^1");

        let mut tree = ResolutionTree::default();
        tree.packages.insert(
            "zlib".to_string(),
            ResolvedPackage::new(&meta, sig, vec!["root".to_string()]),
        );

        assert_eq!(tree.render(), "zlib  1.3.0  /cache/zlib\n");
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["packages"]["zlib"]["version"], "1.3.0");
    }
}
