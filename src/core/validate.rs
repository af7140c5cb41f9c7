//! Manifest validation for fetched packages.
//!
//! Validation never blocks resolution on its own: problems come back as
//! warnings, and the manager decides whether strict mode makes them fatal.

use crate::core::declaration::EndpointDeclaration;
use crate::core::manifest::RawManifest;
use crate::core::package_meta::PackageMeta;
use crate::resolver::version::parse_version_lenient;

/// Validates the manifest of every fetched package.
pub trait ManifestValidator: Send + Sync {
    /// Return a list of problems; empty means the manifest is fine.
    fn validate(
        &self,
        manifest: Option<&RawManifest>,
        meta: &PackageMeta,
        decl: &EndpointDeclaration,
    ) -> Vec<String>;
}

/// Checks name, version and presence of the manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl ManifestValidator for DefaultValidator {
    fn validate(
        &self,
        manifest: Option<&RawManifest>,
        meta: &PackageMeta,
        decl: &EndpointDeclaration,
    ) -> Vec<String> {
        let Some(manifest) = manifest else {
            return vec![format!("`{}` has no manifest", decl.name)];
        };

        let mut problems = Vec::new();

        match manifest.name() {
            None => problems.push("missing `package.name`".to_string()),
            Some(name) => {
                if let Err(e) = validate_package_name(name) {
                    problems.push(e);
                }
                if name != decl.name {
                    problems.push(format!(
                        "declared as `{}` but manifest names `{}`",
                        decl.name, name
                    ));
                }
            }
        }

        match manifest.version() {
            None => problems.push("missing `package.version`".to_string()),
            Some(v) => match parse_version_lenient(v) {
                None => problems.push(format!("invalid `package.version`: {}", v)),
                Some(declared) => {
                    if let Some(fetched) = &meta.resolved_version {
                        if *fetched != declared {
                            problems.push(format!(
                                "manifest version {} differs from fetched version {}",
                                declared, fetched
                            ));
                        }
                    }
                }
            },
        }

        problems
    }
}

/// Validate a package name.
///
/// Names start with a lowercase letter or digit and contain only
/// `[a-z0-9._-]`.
pub fn validate_package_name(name: &str) -> Result<(), String> {
    let Some(first) = name.chars().next() else {
        return Err("package name cannot be empty".to_string());
    };

    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return Err(format!(
            "invalid package name '{}': must start with [a-z0-9]",
            name
        ));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '_' | '-' | '.'))
    {
        return Err(format!(
            "invalid package name '{}': only [a-z0-9._-] allowed, found '{}'",
            name, c
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Target;
    use semver::Version;
    use std::path::PathBuf;

    fn meta(version: Option<Version>) -> PackageMeta {
        PackageMeta {
            name: "zlib".to_string(),
            resolved_version: version,
            resolved_ref: "v1.3.0".to_string(),
            source_path: PathBuf::from("/tmp/zlib"),
            dependencies: Vec::new(),
        }
    }

    fn decl() -> EndpointDeclaration {
        EndpointDeclaration::root("zlib", "zlib", Target::any())
    }

    #[test]
    fn test_valid_manifest() {
        let manifest =
            RawManifest::parse("[package]\nname = \"zlib\"\nversion = \"1.3.0\"\n").unwrap();
        let problems =
            DefaultValidator.validate(Some(&manifest), &meta(Some(Version::new(1, 3, 0))), &decl());
        assert!(problems.is_empty(), "{:?}", problems);
    }

    #[test]
    fn test_missing_manifest() {
        let problems = DefaultValidator.validate(None, &meta(None), &decl());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("no manifest"));
    }

    #[test]
    fn test_mismatches() {
        let manifest =
            RawManifest::parse("[package]\nname = \"libz\"\nversion = \"1.2.0\"\n").unwrap();
        let problems =
            DefaultValidator.validate(Some(&manifest), &meta(Some(Version::new(1, 3, 0))), &decl());
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("manifest names `libz`")));
        assert!(problems.iter().any(|p| p.contains("differs from fetched version")));
    }

    #[test]
    fn test_package_names() {
        assert!(validate_package_name("zlib").is_ok());
        assert!(validate_package_name("lib-json_2.x").is_ok());
        assert!(validate_package_name("").is_err());
        assert!(validate_package_name("Zlib").is_err());
        assert!(validate_package_name("z lib").is_err());
    }
}
