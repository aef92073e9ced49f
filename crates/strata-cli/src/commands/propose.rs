use clap::Args;
use serde::Serialize;
use strata::ids::{AgentId, LaneName, StateId};
use strata::model::{Agent, CostRecord, Intent};

use crate::context::{now_secs, Context};
use crate::format;

/// Record an intent and propose a transition from one state to another
#[derive(Args, Debug)]
pub struct ProposeArgs {
    /// State the transition moves to
    pub to: String,

    /// State the transition moves from (omit for a lane's first transition)
    #[arg(long)]
    pub from: Option<String>,

    /// Lane the transition targets
    #[arg(long, default_value = "main")]
    pub lane: String,

    /// What the change was trying to accomplish
    #[arg(long)]
    pub prompt: String,

    /// Identity of the agent proposing the change
    #[arg(long, default_value = "cli")]
    pub agent_id: String,

    /// Kind of agent (coding, review, planning, ...)
    #[arg(long, default_value = "coding")]
    pub agent_type: String,

    /// Model name, if applicable
    #[arg(long)]
    pub model: Option<String>,

    /// Free-form tags, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Input token cost to record against the lane's budget
    #[arg(long, default_value_t = 0)]
    pub tokens_in: u64,

    /// Output token cost to record against the lane's budget
    #[arg(long, default_value_t = 0)]
    pub tokens_out: u64,
}

#[derive(Serialize)]
struct ProposeOutput {
    transition: String,
}

pub fn run(ctx: &Context, args: &ProposeArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let to = args.to.parse::<StateId>()?;
    let from = args.from.as_deref().map(str::parse::<StateId>).transpose()?;
    let lane = LaneName::new(args.lane.clone())?;
    let agent_id = AgentId::new(args.agent_id.clone())?;

    let intent = Intent {
        id: strata::ids::IntentId::generate(),
        prompt: args.prompt.clone(),
        agent: Agent { agent_id, agent_type: args.agent_type.clone(), model: args.model.clone(), session_id: None },
        context_refs: vec![],
        tags: args.tags.clone(),
        metadata: serde_json::Value::Null,
        created_at: now_secs(),
    };
    let cost = CostRecord { tokens_in: args.tokens_in, tokens_out: args.tokens_out, ..Default::default() };

    let transition = repo.propose(from, to, intent, lane, cost)?;
    let output = ProposeOutput { transition: transition.to_string() };
    format::emit(ctx, &output, |o| println!("{}", ctx.short(&o.transition)));
    Ok(())
}
