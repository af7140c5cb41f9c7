//! Resolution error types and diagnostics.

use thiserror::Error;

use crate::util::diagnostic::{hints, Diagnostic};

/// Why a package could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error, miette::Diagnostic)]
pub enum ResolveError {
    #[error("`{package}` needs `{tool}`, which is not installed")]
    #[diagnostic(
        code(dockyard::resolve::missing_tool),
        help("Install `{tool}` or place it in .dockyard/bin")
    )]
    MissingDependencyTool { tool: String, package: String },

    #[error("`{package}` ({locator}) needs the network, but resolution is offline")]
    #[diagnostic(code(dockyard::resolve::network_disabled))]
    NetworkDisabled { package: String, locator: String },

    #[error("no resolver can handle `{locator}` for `{package}`")]
    #[diagnostic(code(dockyard::resolve::unresolvable_source))]
    UnresolvableSource { package: String, locator: String },

    #[error("version conflict for `{package}`")]
    #[diagnostic(code(dockyard::resolve::version_conflict))]
    VersionConflict {
        package: String,
        requirements: Vec<(String, String)>, // (requirer, requirement)
    },

    #[error("no matching version for `{package}`")]
    #[diagnostic(code(dockyard::resolve::no_matching_version))]
    NoMatchingVersion {
        package: String,
        requirement: String,
        available: Vec<String>,
    },

    #[error("failed to fetch `{package}` from {locator} after {attempts} attempt(s): {message}")]
    #[diagnostic(code(dockyard::resolve::fetch_failure))]
    FetchFailure {
        package: String,
        locator: String,
        attempts: u32,
        message: String,
    },

    #[error("invalid manifest for `{package}`")]
    #[diagnostic(code(dockyard::resolve::manifest_invalid))]
    ManifestInvalid {
        package: String,
        problems: Vec<String>,
    },
}

impl ResolveError {
    /// The package this error is about.
    pub fn package(&self) -> &str {
        match self {
            ResolveError::MissingDependencyTool { package, .. }
            | ResolveError::NetworkDisabled { package, .. }
            | ResolveError::UnresolvableSource { package, .. }
            | ResolveError::VersionConflict { package, .. }
            | ResolveError::NoMatchingVersion { package, .. }
            | ResolveError::FetchFailure { package, .. }
            | ResolveError::ManifestInvalid { package, .. } => package,
        }
    }

    /// Stable kind name, as used in JSON output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResolveError::MissingDependencyTool { .. } => "missing-dependency-tool",
            ResolveError::NetworkDisabled { .. } => "network-disabled",
            ResolveError::UnresolvableSource { .. } => "unresolvable-source",
            ResolveError::VersionConflict { .. } => "version-conflict",
            ResolveError::NoMatchingVersion { .. } => "no-matching-version",
            ResolveError::FetchFailure { .. } => "fetch-failure",
            ResolveError::ManifestInvalid { .. } => "manifest-invalid",
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::MissingDependencyTool { tool, package } => Diagnostic::error(format!(
                "`{}` cannot be fetched: `{}` is not installed",
                package, tool
            ))
            .with_hint(format!("Install `{}` and make sure it is on PATH", tool))
            .with_hint(format!("Or place the executable in .dockyard/bin/{}", tool)),

            ResolveError::NetworkDisabled { package, locator } => Diagnostic::error(format!(
                "`{}` is not cached and resolution is offline",
                package
            ))
            .with_source(locator)
            .with_hint(hints::GO_ONLINE),

            ResolveError::UnresolvableSource { package, locator } => Diagnostic::error(format!(
                "cannot resolve source `{}` for `{}`",
                locator, package
            ))
            .with_hint("Use a git remote, a local path, an http(s) URL, or a registry name")
            .with_hint("Or set `kind` explicitly in the dependency table"),

            ResolveError::VersionConflict {
                package,
                requirements,
            } => {
                let mut diag = Diagnostic::error(format!("version conflict for `{}`", package));

                for (requirer, req) in requirements {
                    diag = diag.with_requirement(requirer, package, req);
                }

                diag.with_hint(format!(
                    "Upgrade packages to compatible versions of `{}`",
                    package
                ))
                .with_hint(format!(
                    "Declare `{}` in the root manifest to pick one version explicitly",
                    package
                ))
            }

            ResolveError::NoMatchingVersion {
                package,
                requirement,
                available,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "no version of `{}` matches requirement `{}`",
                    package, requirement
                ));

                if !available.is_empty() {
                    diag = diag.with_detail(format!(
                        "available versions: {}",
                        available.join(", ")
                    ));
                }

                diag.with_hint(format!(
                    "Update your version requirement for `{}`",
                    package
                ))
            }

            ResolveError::FetchFailure {
                package,
                locator,
                attempts,
                message,
            } => Diagnostic::error(format!("failed to fetch `{}`", package))
                .with_source(locator)
                .with_detail(format!("gave up after {} attempt(s)", attempts))
                .with_detail(message.clone())
                .with_hint(hints::FETCH_FAILED),

            ResolveError::ManifestInvalid { package, problems } => {
                let mut diag =
                    Diagnostic::error(format!("manifest of `{}` is invalid", package));
                for problem in problems {
                    diag = diag.with_detail(problem.clone());
                }
                diag.with_hint("Run without `--strict` to treat these as warnings")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_diagnostic() {
        let err = ResolveError::VersionConflict {
            package: "openssl".to_string(),
            requirements: vec![
                ("myapp".to_string(), "^3.0".to_string()),
                ("legacy-lib".to_string(), "^1.1".to_string()),
            ],
        };

        let output = err.to_diagnostic().format(false);

        assert!(output.contains("version conflict"));
        assert!(output.contains("`myapp` requires openssl ^3.0"));
        assert!(output.contains("`legacy-lib` requires openssl ^1.1"));
    }

    #[test]
    fn test_fetch_failure_message() {
        let err = ResolveError::FetchFailure {
            package: "zlib".to_string(),
            locator: "https://example.com/zlib.tgz".to_string(),
            attempts: 3,
            message: "HTTP 503".to_string(),
        };

        assert_eq!(err.package(), "zlib");
        assert_eq!(err.kind_name(), "fetch-failure");
        assert!(err.to_string().contains("after 3 attempt(s): HTTP 503"));
        assert!(err.to_diagnostic().format(false).contains("gave up after 3"));
    }

    #[test]
    fn test_miette_codes() {
        use miette::Diagnostic as _;

        let err = ResolveError::NetworkDisabled {
            package: "zlib".to_string(),
            locator: "zlib".to_string(),
        };
        assert_eq!(
            err.code().map(|c| c.to_string()),
            Some("dockyard::resolve::network_disabled".to_string())
        );
    }
}
