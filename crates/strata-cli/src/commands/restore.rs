use clap::Args;
use serde::Serialize;
use strata::ids::{StateId, WorkspaceName};

use crate::context::Context;
use crate::format;

/// Materialize a state's tree into a workspace directory, overwriting its contents
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// State to materialize
    pub state: String,

    /// Workspace to restore into
    #[arg(long, default_value = "main")]
    pub workspace: String,
}

#[derive(Serialize)]
struct RestoreOutput {
    workspace: String,
    state: String,
}

pub fn run(ctx: &Context, args: &RestoreArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let workspace = WorkspaceName::new(args.workspace.clone())?;
    let state: StateId = args.state.parse()?;
    repo.restore(&workspace, state.clone())?;
    let output = RestoreOutput { workspace: workspace.to_string(), state: state.to_string() };
    format::emit(ctx, &output, |o| println!("restored '{}' to {}", o.workspace, ctx.short(&o.state)));
    Ok(())
}
