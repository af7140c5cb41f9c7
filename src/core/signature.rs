//! Canonical request signatures.
//!
//! Two declarations with the same signature resolve to the same fetch
//! outcome, so the signature is the key for in-flight deduplication and
//! for the on-disk cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sources::ResolverKind;
use crate::util::hash::Fingerprint;

/// Canonical key over `(resolver kind, normalized source, target)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
    kind: ResolverKind,
    source: String,
    target: String,
    key: String,
}

impl Signature {
    /// Create a signature from already-normalized components.
    pub fn new(kind: ResolverKind, source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();

        let mut fp = Fingerprint::new();
        fp.update_str(kind.as_str())
            .update_str(&source)
            .update_str(&target);

        Signature {
            kind,
            source,
            target,
            key: fp.finish_short(),
        }
    }

    /// Same kind and source, different target.
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        Signature::new(self.kind, self.source.clone(), target)
    }

    /// Key used for this source's candidate listing.
    pub fn listing_key(&self) -> String {
        format!("{}+{}", self.kind, self.source)
    }

    pub fn kind(&self) -> ResolverKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Short hex key, safe to use as a directory name.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}#{}", self.kind, self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = Signature::new(ResolverKind::Git, "https://github.com/acme/json.git", "v1.0.0");
        let b = Signature::new(ResolverKind::Git, "https://github.com/acme/json.git", "v1.0.0");
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().len(), 16);
    }

    #[test]
    fn test_signature_components_matter() {
        let base = Signature::new(ResolverKind::Git, "https://x/y.git", "v1");
        assert_ne!(base, base.with_target("v2"));
        assert_ne!(
            base.key(),
            Signature::new(ResolverKind::Url, "https://x/y.git", "v1").key()
        );
        assert_eq!(base.listing_key(), "git+https://x/y.git");
        assert_eq!(base.to_string(), "git+https://x/y.git#v1");
    }
}
