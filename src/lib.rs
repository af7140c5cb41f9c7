//! Dockyard - dependency resolution for a source-based package manager
//!
//! This crate resolves a graph of dependency declarations into a
//! conflict-free set of fetched packages in a local cache. Sources are
//! version-control remotes, local paths, archive URLs and registries.

pub mod core;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Test doubles for Dockyard unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides an in-memory resolver, a fixed tool probe, and on-disk
/// package fixtures.
#[cfg(test)]
pub mod test_support;

pub use core::{EndpointDeclaration, Signature, Target};
pub use resolver::{ErrorReport, ResolutionManager, ResolutionTree, ResolveError, ResolveOptions};
pub use sources::ResolverRegistry;
pub use util::context::GlobalContext;
