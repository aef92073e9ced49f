use clap::Args;
use serde::Serialize;

use crate::context::Context;
use crate::format;

/// List every lane
#[derive(Args, Debug)]
pub struct LanesArgs {}

#[derive(Serialize)]
struct LaneEntry {
    name: String,
    head_state: Option<String>,
    fork_base: Option<String>,
}

pub fn run(ctx: &Context, _args: &LanesArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let lanes: Vec<LaneEntry> = repo
        .world_state()
        .list_lanes(repo.store())?
        .into_iter()
        .map(|l| LaneEntry { name: l.name.to_string(), head_state: l.head_state.map(|s| s.to_string()), fork_base: l.fork_base.map(|s| s.to_string()) })
        .collect();
    format::emit(ctx, &lanes, |lanes| {
        for l in lanes {
            if ctx.quiet {
                println!("{}", l.name);
            } else {
                println!(
                    "{} head={} fork_base={}",
                    l.name,
                    l.head_state.as_deref().map_or("<none>".to_owned(), |s| ctx.short(s)),
                    l.fork_base.as_deref().map_or("<none>".to_owned(), |s| ctx.short(s)),
                );
            }
        }
    });
    Ok(())
}
