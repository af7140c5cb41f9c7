//! `dockyard cache` command
//!
//! Inspect and clear the package cache.

use anyhow::Result;

use crate::cli::{CacheArgs, CacheCommands};
use dockyard::ops::{project_options, ResolveOverrides};
use dockyard::sources::PackageCache;
use dockyard::util::GlobalContext;

pub fn execute(args: CacheArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let overrides = ResolveOverrides {
        cache_dir: args.cache.cache_dir,
        ..Default::default()
    };
    let options = project_options(&ctx, &overrides);
    let cache = PackageCache::open(&options.cache_dir)?;

    match args.command {
        CacheCommands::List => list_cache(&cache),
        CacheCommands::Clean => {
            cache.clean()?;
            eprintln!("     Removed {}", cache.root().display());
            Ok(())
        }
    }
}

fn list_cache(cache: &PackageCache) -> Result<()> {
    println!("Cache directory: {}", cache.root().display());

    let entries = cache.entries()?;
    if entries.is_empty() {
        println!("  (empty)");
        return Ok(());
    }

    for entry in entries {
        let marker = if entry.mutable { " (mutable)" } else { "" };
        println!(
            "  {} {}{}",
            entry.meta.name,
            entry.meta.display_version(),
            marker
        );
        println!("      {}", entry.signature);
    }
    Ok(())
}
