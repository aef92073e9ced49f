use clap::Args;
use serde::Serialize;
use strata::ids::TransitionId;

use crate::context::Context;
use crate::format;

/// Reject a proposed transition outright
#[derive(Args, Debug)]
pub struct RejectArgs {
    /// Transition to reject
    pub transition: String,

    /// Why the transition was rejected
    #[arg(long, default_value = "rejected via cli")]
    pub summary: String,
}

#[derive(Serialize)]
struct RejectOutput {
    status: String,
}

pub fn run(ctx: &Context, args: &RejectArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let transition_id: TransitionId = args.transition.parse()?;
    let status = repo.reject(&transition_id, args.summary.clone())?;
    let output = RejectOutput { status: status.to_string() };
    format::emit(ctx, &output, |o| println!("{}", o.status));
    Ok(())
}
