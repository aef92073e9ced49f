use clap::Args;
use serde::Serialize;
use strata::ids::{AgentId, WorkspaceName};
use strata::model::{Agent, CostRecord, EvaluationResult, Intent};

use crate::context::{now_secs, Context};
use crate::format;

/// Snapshot, propose, and immediately accept a workspace's current contents
///
/// A shorthand for the common single-agent case: `snapshot` + `propose` +
/// `accept` as one step, skipping the evaluator round trip. Concurrent
/// multi-agent work should still use propose/evaluate/accept directly so
/// the stale-accept rule can reconcile competing proposals.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Workspace to commit
    #[arg(long, default_value = "main")]
    pub workspace: String,

    /// What the change was trying to accomplish
    #[arg(long)]
    pub prompt: String,

    /// Identity of the agent committing the change
    #[arg(long, default_value = "cli")]
    pub agent_id: String,

    /// Kind of agent (coding, review, planning, ...)
    #[arg(long, default_value = "coding")]
    pub agent_type: String,

    /// Free-form tags, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Serialize)]
struct CommitOutput {
    state: String,
    transition: String,
    status: String,
}

pub fn run(ctx: &Context, args: &CommitArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let workspace = WorkspaceName::new(args.workspace.clone())?;
    let info = repo.workspaces().info(&workspace)?.ok_or_else(|| strata::StrataError::NotFound {
        kind: "workspace".to_owned(),
        id: workspace.to_string(),
    })?;
    let lane = info.lane.clone();
    let from = info.base_state.clone();

    let state = repo.snapshot(&workspace, from.clone())?;
    let agent_id = AgentId::new(args.agent_id.clone())?;
    let intent = Intent {
        id: strata::ids::IntentId::generate(),
        prompt: args.prompt.clone(),
        agent: Agent { agent_id, agent_type: args.agent_type.clone(), model: None, session_id: None },
        context_refs: vec![],
        tags: args.tags.clone(),
        metadata: serde_json::Value::Null,
        created_at: now_secs(),
    };
    let transition = repo.propose(from, state.clone(), intent, lane, CostRecord::default())?;
    let status = repo.accept(&transition, EvaluationResult::passed("committed via cli"))?;

    let output = CommitOutput { state: state.to_string(), transition: transition.to_string(), status: status.to_string() };
    format::emit(ctx, &output, |o| println!("{} {} ({})", ctx.short(&o.state), ctx.short(&o.transition), o.status));
    Ok(())
}
