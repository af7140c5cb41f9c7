//! Core data structures for Dockyard.
//!
//! This module contains the foundational types used throughout Dockyard:
//! - Endpoint declarations and their targets
//! - Canonical signatures for deduplication
//! - Fetched package metadata and candidate refs
//! - Manifests and manifest validation

pub mod declaration;
pub mod manifest;
pub mod package_meta;
pub mod signature;
pub mod validate;

pub use declaration::{EndpointDeclaration, Target, ROOT};
pub use manifest::{find_manifest, RawManifest, MANIFEST_NAME};
pub use package_meta::{Candidate, CandidateKind, PackageMeta};
pub use signature::Signature;
pub use validate::{DefaultValidator, ManifestValidator};
