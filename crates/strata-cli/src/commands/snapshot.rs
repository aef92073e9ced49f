use clap::Args;
use serde::Serialize;
use strata::ids::{StateId, WorkspaceName};

use crate::context::Context;
use crate::format;

/// Snapshot a workspace's current contents into a new state
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Workspace to snapshot
    #[arg(long, default_value = "main")]
    pub workspace: String,

    /// Parent state to record (defaults to the workspace's current base state)
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(Serialize)]
struct SnapshotOutput {
    state: String,
}

pub fn run(ctx: &Context, args: &SnapshotArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let workspace = WorkspaceName::new(args.workspace.clone())?;
    let parent = match &args.parent {
        Some(p) => Some(p.parse::<StateId>()?),
        None => repo.workspaces().info(&workspace)?.and_then(|w| w.base_state),
    };
    let state = repo.snapshot(&workspace, parent)?;
    let output = SnapshotOutput { state: state.to_string() };
    format::emit(ctx, &output, |o| println!("{}", ctx.short(&o.state)));
    Ok(())
}
