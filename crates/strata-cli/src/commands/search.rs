use clap::Args;
use serde::Serialize;

use crate::context::Context;
use crate::format;

/// Free-text search over recorded intent prompts and tags
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Substring to look for, case-insensitive
    pub query: String,
}

#[derive(Serialize)]
struct SearchHit {
    intent: String,
    prompt: String,
    agent_id: String,
}

pub fn run(ctx: &Context, args: &SearchArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let hits: Vec<SearchHit> = repo
        .world_state()
        .search_intents(repo.store(), &args.query)?
        .into_iter()
        .map(|i| SearchHit { intent: i.id.to_string(), prompt: i.prompt, agent_id: i.agent.agent_id.to_string() })
        .collect();
    format::emit(ctx, &hits, |hits| {
        for h in hits {
            println!("{} [{}] {}", ctx.short(&h.intent), h.agent_id, h.prompt);
        }
    });
    Ok(())
}
