//! CLI definitions using clap.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Dockyard - dependency resolution for a source-based package manager
#[derive(Parser)]
#[command(name = "dockyard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Whether diagnostics on stderr should be colored.
    pub fn color(&self) -> bool {
        !self.no_color && std::io::stderr().is_terminal()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve and fetch the dependencies of the current project
    Resolve(ResolveArgs),

    /// Inspect or clear the package cache
    Cache(CacheArgs),
}

/// Options shared by commands that open the cache.
#[derive(Args)]
pub struct CacheDirArg {
    /// Package cache directory [default: from config, then ~/.dockyard/cache]
    #[arg(long, env = "DOCKYARD_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Print the resolved tree as JSON
    #[arg(long)]
    pub json: bool,

    /// Only use cached packages and listings
    #[arg(long, env = "DOCKYARD_OFFLINE")]
    pub offline: bool,

    /// Maximum number of concurrent fetches
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Treat manifest warnings as errors
    #[arg(long)]
    pub strict: bool,

    #[command(flatten)]
    pub cache: CacheDirArg,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,

    #[command(flatten)]
    pub cache: CacheDirArg,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cached packages
    List,

    /// Remove every cached package and listing
    Clean,
}
