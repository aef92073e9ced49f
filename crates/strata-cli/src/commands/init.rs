use clap::Args;
use serde::Serialize;
use strata::Repository;

use crate::context::Context;
use crate::format;

/// Initialize a new repository in the current (or given) directory
#[derive(Args, Debug)]
pub struct InitArgs {}

#[derive(Serialize)]
struct InitOutput {
    root: String,
    default_lane: String,
}

pub fn run(ctx: &Context, _args: &InitArgs) -> strata::Result<()> {
    let root = ctx.init_root();
    let repo = Repository::init(&root)?;
    let output = InitOutput {
        root: root.display().to_string(),
        default_lane: repo.config().default_lane.clone(),
    };
    format::emit(ctx, &output, |o| {
        if !ctx.quiet {
            println!("initialized strata repository at {}", o.root);
        }
        println!("{}", o.default_lane);
    });
    Ok(())
}
