//! Terminal rendering of resolution errors and warnings.
//!
//! A diagnostic is a headline plus the facts that led to it: which
//! declarations asked for what, the chain of packages that pulled the
//! failing one in, and hints for getting past it.

use std::fmt;

/// Hints shared by several diagnostics.
pub mod hints {
    pub const NO_MANIFEST: &str = "Create a Dockyard.toml in the project root";

    pub const FETCH_FAILED: &str = "Check your network connection and run `dockyard resolve` again";

    pub const GO_ONLINE: &str = "Run once without `--offline` to populate the cache";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self, color: bool) -> &'static str {
        match (self, color) {
            (Severity::Error, false) => "error",
            (Severity::Warning, false) => "warning",
            (Severity::Error, true) => "\x1b[1;31merror\x1b[0m",
            (Severity::Warning, true) => "\x1b[1;33mwarning\x1b[0m",
        }
    }
}

/// One fact attached under the headline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    /// `requirer` declared `package` with `requirement`
    Requirement {
        requirer: String,
        package: String,
        requirement: String,
    },
    /// Packages from the root down to the one the diagnostic is about
    RequiredBy(Vec<String>),
    /// Locator the package was declared with
    Source(String),
    Detail(String),
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Note::Requirement {
                requirer,
                package,
                requirement,
            } => write!(f, "`{}` requires {} {}", requirer, package, requirement),
            Note::RequiredBy(chain) => write!(f, "required by: {}", chain.join(" -> ")),
            Note::Source(locator) => write!(f, "source: {}", locator),
            Note::Detail(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub notes: Vec<Note>,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, message.into())
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Warning, message.into())
    }

    fn new(severity: Severity, message: String) -> Self {
        Diagnostic {
            severity,
            message,
            notes: Vec::new(),
            hints: Vec::new(),
        }
    }

    pub fn with_requirement(
        mut self,
        requirer: impl Into<String>,
        package: impl Into<String>,
        requirement: impl Into<String>,
    ) -> Self {
        self.notes.push(Note::Requirement {
            requirer: requirer.into(),
            package: package.into(),
            requirement: requirement.into(),
        });
        self
    }

    /// Record the declaration chain. The chain note always renders first.
    pub fn required_by(mut self, chain: Vec<String>) -> Self {
        self.notes.insert(0, Note::RequiredBy(chain));
        self
    }

    pub fn with_source(mut self, locator: impl Into<String>) -> Self {
        self.notes.push(Note::Source(locator.into()));
        self
    }

    pub fn with_detail(mut self, text: impl Into<String>) -> Self {
        self.notes.push(Note::Detail(text.into()));
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Render for the terminal:
    ///
    /// ```text
    /// error: version conflict for `openssl`
    ///   = required by: root -> curl -> openssl
    ///   = `curl` requires openssl ^3.0
    ///   help: Upgrade packages to compatible versions of `openssl`
    /// ```
    pub fn format(&self, color: bool) -> String {
        let mut out = format!("{}: {}\n", self.severity.label(color), self.message);

        for note in &self.notes {
            out.push_str(&format!("  = {}\n", note));
        }

        let help = if color { "\x1b[1;32mhelp\x1b[0m" } else { "help" };
        for hint in &self.hints {
            out.push_str(&format!("  {}: {}\n", help, hint));
        }

        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_layout() {
        let diag = Diagnostic::error("version conflict for `openssl`")
            .with_requirement("curl", "openssl", "^3.0")
            .with_requirement("legacy", "openssl", "^1.1")
            .required_by(vec!["root".into(), "curl".into(), "openssl".into()])
            .with_hint("Upgrade packages to compatible versions of `openssl`");

        assert_eq!(
            diag.format(false),
            "error: version conflict for `openssl`\n\
             \x20 = required by: root -> curl -> openssl\n\
             \x20 = `curl` requires openssl ^3.0\n\
             \x20 = `legacy` requires openssl ^1.1\n\
             \x20 help: Upgrade packages to compatible versions of `openssl`\n"
        );
    }

    #[test]
    fn test_source_and_detail_notes() {
        let output = Diagnostic::error("failed to fetch `zlib`")
            .with_source("https://example.com/zlib.tar.gz")
            .with_detail("gave up after 3 attempt(s)")
            .to_string();

        assert!(output.contains("= source: https://example.com/zlib.tar.gz\n"));
        assert!(output.ends_with("= gave up after 3 attempt(s)\n"));
    }

    #[test]
    fn test_plain_warning_is_one_line() {
        let output = Diagnostic::warning("stale cache for `zlib`").format(false);
        assert_eq!(output, "warning: stale cache for `zlib`\n");
    }

    #[test]
    fn test_color_labels() {
        let output = Diagnostic::error("boom").with_hint("retry").format(true);
        assert!(output.starts_with("\x1b[1;31merror\x1b[0m: boom"));
        assert!(output.contains("\x1b[1;32mhelp\x1b[0m: retry"));
    }
}
