//! Dockyard.toml manifest parsing.
//!
//! The manifest is the package's own dependency descriptor and the source
//! of transitive declarations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::declaration::{EndpointDeclaration, Target};
use crate::core::package_meta::{Candidate, PackageMeta};
use crate::resolver::version::parse_version_lenient;
use crate::resolver::ResolveError;
use crate::sources::{dispatch, ResolverKind};
use crate::util::fs::normalize_path;

/// Manifest file name.
pub const MANIFEST_NAME: &str = "Dockyard.toml";

/// A manifest as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawManifest {
    #[serde(default)]
    pub package: Option<PackageSection>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
}

/// The `[package]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageSection {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// Dependency specification as it appears in Dockyard.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// `foo = "^1.0"` or `foo = "git@host:foo.git#v1.0"`
    Simple(String),

    /// `foo = { source = "../foo", target = "*" }`
    Detailed(DetailedDependencySpec),
}

/// Detailed dependency specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailedDependencySpec {
    /// Source locator (defaults to the dependency name, i.e. a registry lookup)
    #[serde(default)]
    pub source: Option<String>,

    /// Version range, tag, branch or commit
    #[serde(default)]
    pub target: Option<String>,

    /// Alias for `target`
    #[serde(default)]
    pub version: Option<String>,

    /// Resolver type hint (git, path, url, registry)
    #[serde(default)]
    pub kind: Option<ResolverKind>,
}

impl DependencySpec {
    /// Convert to a declaration.
    ///
    /// Relative local paths are resolved against `base_dir`, the directory
    /// of the declaring package.
    pub fn to_declaration(
        &self,
        name: &str,
        declared_by: &str,
        explicit: bool,
        base_dir: &Path,
    ) -> EndpointDeclaration {
        let (source, target, hint) = match self {
            DependencySpec::Simple(s) => {
                let (source, target) = split_locator(name, s);
                (source, target, None)
            }
            DependencySpec::Detailed(spec) => {
                let source = spec.source.clone().unwrap_or_else(|| name.to_string());
                let target = spec
                    .target
                    .as_deref()
                    .or(spec.version.as_deref())
                    .map(Target::parse)
                    .unwrap_or_else(Target::any);
                (source, target, spec.kind)
            }
        };

        let source = absolutize_path_source(&source, hint, base_dir);

        EndpointDeclaration {
            name: name.to_string(),
            source,
            target,
            declared_by: declared_by.to_string(),
            explicit,
            kind_hint: hint,
        }
    }
}

/// Split a simple dependency string into source and target.
fn split_locator(name: &str, s: &str) -> (String, Target) {
    if let Some((source, target)) = s.rsplit_once('#') {
        let source = if source.is_empty() { name } else { source };
        return (source.to_string(), Target::parse(target));
    }

    match Target::parse(s) {
        // A bare version means "this name, from the registry"
        Target::Range(req) => (name.to_string(), Target::Range(req)),
        _ => (s.to_string(), Target::any()),
    }
}

fn absolutize_path_source(source: &str, hint: Option<ResolverKind>, base_dir: &Path) -> String {
    let kind = hint.or_else(|| dispatch::classify(source));
    if kind != Some(ResolverKind::Path) || source.starts_with("file://") || source.starts_with('~')
    {
        return source.to_string();
    }

    let path = Path::new(source);
    if path.is_absolute() {
        return source.to_string();
    }

    normalize_path(&base_dir.join(path)).display().to_string()
}

impl RawManifest {
    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("failed to parse manifest: {}", path.display()))
    }

    /// Parse manifest contents.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// The declared package name.
    pub fn name(&self) -> Option<&str> {
        self.package.as_ref().and_then(|p| p.name.as_deref())
    }

    /// The declared version string.
    pub fn version(&self) -> Option<&str> {
        self.package.as_ref().and_then(|p| p.version.as_deref())
    }

    /// All dependency declarations of this manifest.
    pub fn declarations(
        &self,
        declared_by: &str,
        explicit: bool,
        base_dir: &Path,
    ) -> Vec<EndpointDeclaration> {
        self.dependencies
            .iter()
            .map(|(name, spec)| spec.to_declaration(name, declared_by, explicit, base_dir))
            .collect()
    }
}

/// Find the manifest in a directory.
pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(MANIFEST_NAME);
    path.is_file().then_some(path)
}

/// Load the manifest of a fetched package, if it has one.
///
/// A manifest that cannot be parsed makes the package invalid.
pub fn load_manifest_in(dir: &Path, package: &str) -> Result<Option<RawManifest>, ResolveError> {
    let Some(path) = find_manifest(dir) else {
        return Ok(None);
    };

    RawManifest::load(&path)
        .map(Some)
        .map_err(|e| ResolveError::ManifestInvalid {
            package: package.to_string(),
            problems: vec![format!("{:#}", e)],
        })
}

/// Build package metadata from an already loaded manifest.
///
/// Without a manifest the metadata carries the declared name, the
/// candidate's version and no dependencies.
pub fn package_meta(
    manifest: Option<&RawManifest>,
    dir: &Path,
    base_dir: &Path,
    decl: &EndpointDeclaration,
    candidate: &Candidate,
    resolved_ref: impl Into<String>,
) -> PackageMeta {
    let resolved_version = candidate.version.clone().or_else(|| {
        manifest
            .and_then(|m| m.version())
            .and_then(parse_version_lenient)
    });

    let dependencies = manifest
        .map(|m| m.declarations(&decl.name, false, base_dir))
        .unwrap_or_default();

    PackageMeta {
        name: decl.name.clone(),
        resolved_version,
        resolved_ref: resolved_ref.into(),
        source_path: dir.to_path_buf(),
        dependencies,
    }
}

/// Build package metadata from a fetched directory.
pub fn read_package_meta(
    dir: &Path,
    base_dir: &Path,
    decl: &EndpointDeclaration,
    candidate: &Candidate,
    resolved_ref: impl Into<String>,
) -> Result<PackageMeta> {
    let manifest = load_manifest_in(dir, &decl.name)?;
    Ok(package_meta(
        manifest.as_ref(),
        dir,
        base_dir,
        decl,
        candidate,
        resolved_ref,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[package]
name = "app"
version = "1.0.0"

[dependencies]
zlib = "^1.2"
json = "git@github.com:acme/json.git#v2.1.0"
util = { source = "../util", target = "*" }
pinned = { source = "https://example.com/pinned.git", target = "main", kind = "git" }
tool = "https://example.com/tool.tar.gz"
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = RawManifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.name(), Some("app"));
        assert_eq!(manifest.version(), Some("1.0.0"));
        assert_eq!(manifest.dependencies.len(), 5);
    }

    #[test]
    fn test_declarations() {
        let tmp = TempDir::new().unwrap();
        let manifest = RawManifest::parse(MANIFEST).unwrap();
        let decls = manifest.declarations("root", true, &tmp.path().join("app"));

        let by_name = |n: &str| decls.iter().find(|d| d.name == n).unwrap();

        let zlib = by_name("zlib");
        assert_eq!(zlib.source, "zlib");
        assert_eq!(zlib.target, Target::parse("^1.2"));
        assert!(zlib.explicit);

        let json = by_name("json");
        assert_eq!(json.source, "git@github.com:acme/json.git");
        assert_eq!(json.target, Target::Ref("v2.1.0".to_string()));

        let util = by_name("util");
        assert!(Path::new(&util.source).is_absolute());
        assert!(util.source.ends_with("util"));
        assert!(!util.source.contains(".."));

        let pinned = by_name("pinned");
        assert_eq!(pinned.kind_hint, Some(ResolverKind::Git));
        assert_eq!(pinned.target, Target::Ref("main".to_string()));

        let tool = by_name("tool");
        assert_eq!(tool.source, "https://example.com/tool.tar.gz");
        assert!(tool.target.is_any());
    }

    #[test]
    fn test_bare_full_version_pins_release() {
        let manifest = RawManifest::parse(
            "[package]\nname = \"app\"\n\n[dependencies]\nzlib = \"1.0.0\"\nssl = \"git@github.com:acme/ssl.git#3.0.2\"\n",
        )
        .unwrap();
        let decls = manifest.declarations("root", true, Path::new("/work/app"));

        let zlib = decls.iter().find(|d| d.name == "zlib").unwrap();
        assert_eq!(zlib.source, "zlib");
        let req = zlib.target.as_range().unwrap();
        assert!(req.matches(&Version::new(1, 0, 0)));
        assert!(!req.matches(&Version::new(1, 0, 1)));

        let ssl = decls.iter().find(|d| d.name == "ssl").unwrap();
        assert_eq!(ssl.requirement(), "git@github.com:acme/ssl.git#=3.0.2");
    }

    #[test]
    fn test_read_package_meta() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(MANIFEST_NAME),
            "[package]\nname = \"lib\"\nversion = \"0.3.0\"\n\n[dependencies]\nzlib = \"^1\"\n",
        )
        .unwrap();

        let decl = EndpointDeclaration::root("lib", "lib", Target::any());
        let candidate = Candidate::branch("main", Some("abc".to_string()));
        let meta = read_package_meta(tmp.path(), tmp.path(), &decl, &candidate, "abc").unwrap();

        assert_eq!(meta.name, "lib");
        assert_eq!(meta.resolved_version, Some(Version::new(0, 3, 0)));
        assert_eq!(meta.resolved_ref, "abc");
        assert_eq!(meta.dependencies.len(), 1);
        assert_eq!(meta.dependencies[0].declared_by, "lib");
        assert!(!meta.dependencies[0].explicit);
    }

    #[test]
    fn test_read_package_meta_without_manifest() {
        let tmp = TempDir::new().unwrap();
        let decl = EndpointDeclaration::root("blob", "https://x/blob.tgz", Target::any());
        let candidate = Candidate::archive("https://x/blob.tgz");
        let meta =
            read_package_meta(tmp.path(), tmp.path(), &decl, &candidate, "https://x/blob.tgz")
                .unwrap();

        assert_eq!(meta.name, "blob");
        assert!(meta.resolved_version.is_none());
        assert!(meta.dependencies.is_empty());
    }

    #[test]
    fn test_unparsable_manifest_is_invalid() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_NAME), "[package\nname = ").unwrap();

        let err = load_manifest_in(tmp.path(), "broken").unwrap_err();
        assert!(matches!(err, ResolveError::ManifestInvalid { ref package, .. } if package == "broken"));
        assert!(matches!(load_manifest_in(&tmp.path().join("missing"), "x"), Ok(None)));
    }
}
