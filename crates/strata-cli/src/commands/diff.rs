use clap::Args;
use serde::Serialize;
use strata::ids::StateId;

use crate::context::Context;
use crate::format;

/// Compare two states path-by-path
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// State to diff from
    pub from: String,

    /// State to diff to
    pub to: String,
}

#[derive(Serialize)]
struct DiffOutput {
    added: Vec<String>,
    removed: Vec<String>,
    modified: Vec<String>,
    unchanged_count: usize,
}

pub fn run(ctx: &Context, args: &DiffArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let from: StateId = args.from.parse()?;
    let to: StateId = args.to.parse()?;
    let diff = repo.world_state().diff(repo.store(), &from, &to)?;
    let output = DiffOutput {
        added: diff.added.keys().cloned().collect(),
        removed: diff.removed.keys().cloned().collect(),
        modified: diff.modified.keys().cloned().collect(),
        unchanged_count: diff.unchanged_count,
    };
    format::emit(ctx, &output, |o| {
        for p in &o.added {
            println!("+ {p}");
        }
        for p in &o.removed {
            println!("- {p}");
        }
        for p in &o.modified {
            println!("~ {p}");
        }
        if !ctx.quiet {
            println!("{} unchanged", o.unchanged_count);
        }
    });
    Ok(())
}
