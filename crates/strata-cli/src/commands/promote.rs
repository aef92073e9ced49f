use clap::Args;
use serde::Serialize;
use strata::ids::{AgentId, LaneName, WorkspaceName};
use strata::repository::promote::PromoteOutcome;

use crate::context::Context;
use crate::format;

/// Move a workspace's staged work onto a target lane
#[derive(Args, Debug)]
pub struct PromoteArgs {
    /// Workspace whose state should be promoted
    #[arg(long, default_value = "main")]
    pub workspace: String,

    /// Lane to promote onto
    #[arg(long)]
    pub target_lane: String,

    /// Agent performing the promote
    #[arg(long, default_value = "cli")]
    pub agent_id: String,

    /// Skip conflict detection and rebase onto the target regardless of overlap
    #[arg(long)]
    pub force: bool,
}

#[derive(Serialize)]
struct ConflictEntry {
    path: String,
    lane_action: String,
    target_action: String,
}

#[derive(Serialize)]
struct PromoteOutput {
    transition: Option<String>,
    conflicts: Vec<ConflictEntry>,
}

pub fn run(ctx: &Context, args: &PromoteArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let workspace = WorkspaceName::new(args.workspace.clone())?;
    let target_lane = LaneName::new(args.target_lane.clone())?;
    let agent_id = AgentId::new(args.agent_id.clone())?;

    let outcome = repo.promote(&workspace, &target_lane, agent_id, args.force)?;
    let output = match outcome {
        PromoteOutcome::Proposed(transition_id) => PromoteOutput { transition: Some(transition_id.to_string()), conflicts: Vec::new() },
        PromoteOutcome::Conflicts(conflicts) => PromoteOutput {
            transition: None,
            conflicts: conflicts
                .into_iter()
                .map(|c| ConflictEntry { path: c.path, lane_action: c.lane_action, target_action: c.target_action })
                .collect(),
        },
    };

    format::emit(ctx, &output, |o| {
        if let Some(transition) = &o.transition {
            println!("promoted, transition {}", ctx.short(transition));
        } else {
            println!("promote blocked by {} conflict(s):", o.conflicts.len());
            for c in &o.conflicts {
                println!("  {} (lane: {}, target: {})", c.path, c.lane_action, c.target_action);
            }
        }
    });

    if output.transition.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
