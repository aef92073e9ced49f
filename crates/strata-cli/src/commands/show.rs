use clap::Args;
use serde::Serialize;
use strata::ids::{StateId, TransitionId};

use crate::context::Context;
use crate::format;

/// Show a state or a transition by id, whichever the id resolves to
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// A state id or a transition id
    pub id: String,
}

#[derive(Serialize)]
struct StateOutput {
    kind: &'static str,
    state: String,
    root_tree: String,
    parent: Option<String>,
    created_at: f64,
}

#[derive(Serialize)]
struct TransitionOutput {
    kind: &'static str,
    transition: String,
    from_state: Option<String>,
    to_state: String,
    lane: String,
    status: String,
    intent: String,
}

pub fn run(ctx: &Context, args: &ShowArgs) -> strata::Result<()> {
    let repo = ctx.open()?;

    if let Ok(state_id) = args.id.parse::<StateId>() {
        if let Some((root_tree, parent, created_at)) = repo.world_state().get_state(repo.store(), &state_id)? {
            let output = StateOutput {
                kind: "state",
                state: state_id.to_string(),
                root_tree: root_tree.to_string(),
                parent: parent.map(|p| p.to_string()),
                created_at,
            };
            format::emit(ctx, &output, |o| {
                println!("state {}", ctx.short(&o.state));
                println!("  root tree: {}", ctx.short(&o.root_tree));
                println!("  parent: {}", o.parent.as_deref().map_or_else(|| "<none>".to_owned(), |p| ctx.short(p)));
            });
            return Ok(());
        }
    }

    let transition_id: TransitionId = args.id.parse()?;
    let transition = repo
        .world_state()
        .get_transition(repo.store(), &transition_id)?
        .ok_or_else(|| strata::StrataError::NotFound { kind: "transition".to_owned(), id: args.id.clone() })?;
    let output = TransitionOutput {
        kind: "transition",
        transition: transition_id.to_string(),
        from_state: transition.from_state.map(|s| s.to_string()),
        to_state: transition.to_state.to_string(),
        lane: transition.lane.to_string(),
        status: transition.status.to_string(),
        intent: transition.intent_id.to_string(),
    };
    format::emit(ctx, &output, |o| {
        println!("transition {}", ctx.short(&o.transition));
        println!(
            "  {} -> {} on {}",
            o.from_state.as_deref().map_or_else(|| "<none>".to_owned(), |s| ctx.short(s)),
            ctx.short(&o.to_state),
            o.lane
        );
        println!("  status: {}", o.status);
        println!("  intent: {}", ctx.short(&o.intent));
    });
    Ok(())
}
