//! High-level operations.
//!
//! This module contains the implementation of Dockyard commands.

pub mod resolve;

pub use resolve::{
    project_config, project_options, resolve_project, root_declarations, ResolveOverrides,
};
