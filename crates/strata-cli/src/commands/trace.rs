use clap::Args;
use serde::Serialize;
use strata::ids::StateId;

use crate::context::Context;
use crate::format;

/// Walk a state's accepted-transition ancestry backwards
#[derive(Args, Debug)]
pub struct TraceArgs {
    /// State to trace from
    pub state: String,

    /// Maximum chain length to walk
    #[arg(long, default_value_t = 100)]
    pub max_depth: u64,
}

#[derive(Serialize)]
struct TraceOutput {
    chain: Vec<String>,
}

pub fn run(ctx: &Context, args: &TraceArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let state: StateId = args.state.parse()?;
    let chain = repo.world_state().trace(repo.store(), &state, args.max_depth)?;
    let output = TraceOutput { chain: chain.into_iter().map(|s| s.to_string()).collect() };
    format::emit(ctx, &output, |o| {
        for s in &o.chain {
            println!("{}", ctx.short(s));
        }
    });
    Ok(())
}
