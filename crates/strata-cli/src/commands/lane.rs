use clap::{Args, Subcommand};
use serde::Serialize;
use strata::ids::{LaneName, StateId};

use crate::context::Context;
use crate::format;

/// Create or delete lanes
#[derive(Subcommand, Debug)]
pub enum LaneCommands {
    /// Create a lane, forked from an existing state (or empty)
    Create(LaneCreateArgs),
    /// Delete a lane record (does not touch states or transitions)
    Delete(LaneDeleteArgs),
}

#[derive(Args, Debug)]
pub struct LaneCreateArgs {
    /// Name of the new lane
    pub name: String,

    /// State to fork from
    #[arg(long)]
    pub base: Option<String>,
}

#[derive(Args, Debug)]
pub struct LaneDeleteArgs {
    /// Name of the lane to delete
    pub name: String,
}

#[derive(Serialize)]
struct LaneOutput {
    name: String,
}

pub fn run(ctx: &Context, cmd: &LaneCommands) -> strata::Result<()> {
    let repo = ctx.open()?;
    match cmd {
        LaneCommands::Create(args) => {
            let name = LaneName::new(args.name.clone())?;
            let base = args.base.as_deref().map(str::parse::<StateId>).transpose()?;
            let lane = repo.world_state().create_lane(repo.store(), name, base)?;
            let output = LaneOutput { name: lane.name.to_string() };
            format::emit(ctx, &output, |o| println!("created lane '{}'", o.name));
        }
        LaneCommands::Delete(args) => {
            let name = LaneName::new(args.name.clone())?;
            repo.world_state().delete_lane(repo.store(), &name)?;
            let output = LaneOutput { name: name.to_string() };
            format::emit(ctx, &output, |o| println!("deleted lane '{}'", o.name));
        }
    }
    Ok(())
}
