use clap::{Args, Subcommand};
use serde::Serialize;
use strata::ids::{AgentId, LaneName, StateId, WorkspaceName};
use strata::model::WorkspaceMode;

use crate::context::Context;
use crate::format;

/// List, create, remove, or update isolated workspaces
#[derive(Subcommand, Debug)]
pub enum WorkspaceCommands {
    /// List known workspaces
    List(WorkspaceListArgs),
    /// Create a new workspace materialized from a state
    Create(WorkspaceCreateArgs),
    /// Destroy a workspace (lock, metadata, and directory for non-main workspaces)
    Remove(WorkspaceRemoveArgs),
    /// Update a workspace's contents to a new state
    Update(WorkspaceUpdateArgs),
}

#[derive(Args, Debug)]
pub struct WorkspaceListArgs {}

#[derive(Args, Debug)]
pub struct WorkspaceCreateArgs {
    /// Name of the new workspace
    pub name: String,

    /// Lane the workspace belongs to
    #[arg(long, default_value = "main")]
    pub lane: String,

    /// State to materialize into the workspace (omit for an empty workspace)
    #[arg(long)]
    pub state: Option<String>,

    /// Agent claiming the workspace
    #[arg(long)]
    pub agent_id: Option<String>,

    /// Keep the workspace across multiple promote cycles instead of tearing it down after one
    #[arg(long)]
    pub persistent: bool,
}

#[derive(Args, Debug)]
pub struct WorkspaceRemoveArgs {
    /// Name of the workspace to remove
    pub name: String,
}

#[derive(Args, Debug)]
pub struct WorkspaceUpdateArgs {
    /// Name of the workspace to update
    pub name: String,

    /// State to update the workspace to
    pub state: String,
}

#[derive(Serialize)]
struct WorkspaceEntry {
    name: String,
    lane: String,
    path: String,
    status: String,
    mode: String,
}

pub fn run(ctx: &Context, cmd: &WorkspaceCommands) -> strata::Result<()> {
    let repo = ctx.open()?;
    match cmd {
        WorkspaceCommands::List(_) => {
            let entries: Vec<WorkspaceEntry> = repo
                .list_workspaces()?
                .into_iter()
                .map(|w| WorkspaceEntry {
                    name: w.name.to_string(),
                    lane: w.lane.to_string(),
                    path: w.path.display().to_string(),
                    status: format!("{:?}", w.status).to_lowercase(),
                    mode: format!("{:?}", w.mode).to_lowercase(),
                })
                .collect();
            format::emit(ctx, &entries, |entries| {
                for e in entries {
                    println!("{} [{}] {} ({}, {})", e.name, e.lane, e.path, e.status, e.mode);
                }
            });
        }
        WorkspaceCommands::Create(args) => {
            let name = WorkspaceName::new(args.name.clone())?;
            let lane = LaneName::new(args.lane.clone())?;
            let state = args.state.as_deref().map(str::parse::<StateId>).transpose()?;
            let agent_id = args.agent_id.as_deref().map(AgentId::new).transpose()?;
            let mode = if args.persistent { WorkspaceMode::Persistent } else { WorkspaceMode::Ephemeral };
            let info = repo.workspaces().create(repo.store(), repo.world_state(), name, lane, state, agent_id, mode)?;
            let output = WorkspaceEntry {
                name: info.name.to_string(),
                lane: info.lane.to_string(),
                path: info.path.display().to_string(),
                status: format!("{:?}", info.status).to_lowercase(),
                mode: format!("{:?}", info.mode).to_lowercase(),
            };
            format::emit(ctx, &output, |o| println!("created workspace '{}' at {}", o.name, o.path));
        }
        WorkspaceCommands::Remove(args) => {
            let name = WorkspaceName::new(args.name.clone())?;
            repo.workspaces().destroy(&name)?;
            println!("removed workspace '{name}'");
        }
        WorkspaceCommands::Update(args) => {
            let name = WorkspaceName::new(args.name.clone())?;
            let state: StateId = args.state.parse()?;
            repo.restore(&name, state)?;
            println!("updated workspace '{name}'");
        }
    }
    Ok(())
}
