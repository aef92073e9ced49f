use clap::Args;
use serde::Serialize;
use strata::ids::WorkspaceName;

use crate::context::Context;
use crate::format;

/// Run every configured evaluator against a workspace's materialized contents
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Workspace to evaluate
    #[arg(long, default_value = "main")]
    pub workspace: String,
}

#[derive(Serialize)]
struct EvaluateOutput {
    passed: bool,
    summary: String,
}

pub fn run(ctx: &Context, args: &EvaluateArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let workspace = WorkspaceName::new(args.workspace.clone())?;
    let result = repo.evaluate_workspace(&workspace)?;
    let output = EvaluateOutput { passed: result.passed, summary: result.summary };
    format::emit(ctx, &output, |o| {
        println!("{}: {}", if o.passed { "passed" } else { "failed" }, o.summary);
    });
    if !output.passed {
        std::process::exit(1);
    }
    Ok(())
}
