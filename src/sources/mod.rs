//! Package sources.
//!
//! Resolvers are responsible for listing and fetching packages from
//! various locations (version-control remotes, local paths, URLs,
//! registries). The dispatch table picks one per declaration.

pub mod cache;
pub mod dispatch;
pub mod git;
pub mod path;
pub mod registry;
pub mod source;
pub mod url;

pub use cache::{CacheEntry, PackageCache};
pub use dispatch::ResolverRegistry;
pub use git::GitResolver;
pub use path::PathResolver;
pub use registry::RegistryResolver;
pub use source::{FetchContext, Resolver, ResolverKind};
pub use url::UrlResolver;
