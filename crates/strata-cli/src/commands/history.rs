use clap::Args;
use serde::Serialize;
use strata::ids::LaneName;

use crate::context::Context;
use crate::format;

/// List every transition recorded against a lane, most recent first
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Lane to list history for
    #[arg(long, default_value = "main")]
    pub lane: String,

    /// Maximum number of transitions to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Serialize)]
struct HistoryEntry {
    transition: String,
    from_state: Option<String>,
    to_state: String,
    status: String,
    prompt: String,
    updated_at: f64,
}

pub fn run(ctx: &Context, args: &HistoryArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let lane = LaneName::new(args.lane.clone())?;
    let transitions = repo.world_state().list_transitions_for_lane(repo.store(), &lane)?;

    let entries: Vec<HistoryEntry> = transitions
        .into_iter()
        .take(args.limit)
        .map(|t| {
            let prompt = repo.world_state().get_intent(repo.store(), &t.intent_id).ok().flatten().map(|i| i.prompt).unwrap_or_default();
            HistoryEntry {
                transition: t.id.to_string(),
                from_state: t.from_state.map(|s| s.to_string()),
                to_state: t.to_state.to_string(),
                status: t.status.to_string(),
                prompt,
                updated_at: t.updated_at,
            }
        })
        .collect();

    format::emit(ctx, &entries, |entries| {
        for e in entries {
            if ctx.quiet {
                println!("{}", ctx.short(&e.transition));
            } else {
                println!(
                    "{} {} -> {} [{}] {}",
                    ctx.short(&e.transition),
                    e.from_state.as_deref().map_or("<none>".to_owned(), |s| ctx.short(s)),
                    ctx.short(&e.to_state),
                    e.status,
                    e.prompt,
                );
            }
        }
    });
    Ok(())
}
