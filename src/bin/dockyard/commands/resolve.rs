//! `dockyard resolve` command

use anyhow::{Context, Result};

use crate::cli::ResolveArgs;
use dockyard::ops::{project_options, resolve_project, ResolveOverrides};
use dockyard::resolver::{ErrorReport, ResolutionTree};
use dockyard::util::diagnostic::emit;
use dockyard::util::GlobalContext;

pub fn execute(args: ResolveArgs, color: bool) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let overrides = ResolveOverrides {
        offline: args.offline,
        strict: args.strict,
        jobs: args.jobs,
        cache_dir: args.cache.cache_dir,
    };
    let options = project_options(&ctx, &overrides);

    match resolve_project(&ctx, &options) {
        Ok(tree) => {
            for warning in &tree.warnings {
                emit(&warning.to_diagnostic(), color);
            }
            print_tree(&tree, args.json)
        }
        Err(e) => {
            let Some(report) = e.downcast_ref::<ErrorReport>() else {
                return Err(e);
            };
            eprint!("{}", report.render(color));
            if args.json {
                print_tree(&report.partial, true)?;
            }
            Err(e)
        }
    }
}

fn print_tree(tree: &ResolutionTree, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(tree).context("failed to serialize tree")?;
        println!("{}", out);
    } else if tree.is_empty() {
        eprintln!("No dependencies");
    } else {
        print!("{}", tree.render());
    }
    Ok(())
}
