use clap::Args;
use serde::Serialize;

use crate::context::Context;
use crate::format;

/// Brief repository summary: lanes, workspaces, object counts
#[derive(Args, Debug)]
pub struct StatusArgs {}

#[derive(Serialize)]
struct LaneSummary {
    name: String,
    head_state: Option<String>,
}

#[derive(Serialize)]
struct WorkspaceSummary {
    name: String,
    lane: String,
    status: String,
}

#[derive(Serialize)]
struct StatusOutput {
    lanes: Vec<LaneSummary>,
    workspaces: Vec<WorkspaceSummary>,
    total_objects: u64,
    total_bytes: u64,
}

pub fn run(ctx: &Context, _args: &StatusArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let lanes = repo
        .world_state()
        .list_lanes(repo.store())?
        .into_iter()
        .map(|l| LaneSummary { name: l.name.to_string(), head_state: l.head_state.map(|s| ctx.short(&s.to_string())) })
        .collect();
    let workspaces = repo
        .list_workspaces()?
        .into_iter()
        .map(|w| WorkspaceSummary { name: w.name.to_string(), lane: w.lane.to_string(), status: format!("{:?}", w.status).to_lowercase() })
        .collect();
    let stats = repo.store().stats()?;
    let output = StatusOutput { lanes, workspaces, total_objects: stats.total_objects, total_bytes: stats.total_bytes };

    format::emit(ctx, &output, |o| {
        println!("lanes:");
        for lane in &o.lanes {
            println!("  {} -> {}", lane.name, lane.head_state.as_deref().unwrap_or("<empty>"));
        }
        println!("workspaces:");
        for ws in &o.workspaces {
            println!("  {} [{}] ({})", ws.name, ws.lane, ws.status);
        }
        if !ctx.quiet {
            println!("objects: {} ({} bytes)", o.total_objects, o.total_bytes);
        }
    });
    Ok(())
}
