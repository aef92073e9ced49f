use clap::Args;
use serde::Serialize;
use strata::ids::TransitionId;
use strata::model::EvaluationResult;

use crate::context::Context;
use crate::format;

/// Accept a proposed transition
#[derive(Args, Debug)]
pub struct AcceptArgs {
    /// Transition to accept
    pub transition: String,

    /// Evaluator summary to record alongside the accept
    #[arg(long, default_value = "accepted via cli")]
    pub summary: String,

    /// Run the lane's configured evaluators first; only accept if they pass
    #[arg(long)]
    pub run_evaluators: bool,

    /// Workspace to evaluate against, when `--run-evaluators` is set
    #[arg(long, default_value = "main")]
    pub workspace: String,
}

#[derive(Serialize)]
struct AcceptOutput {
    status: String,
}

pub fn run(ctx: &Context, args: &AcceptArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let transition_id: TransitionId = args.transition.parse()?;

    let result = if args.run_evaluators {
        let workspace = strata::ids::WorkspaceName::new(args.workspace.clone())?;
        repo.evaluate_workspace(&workspace)?
    } else {
        EvaluationResult::passed(args.summary.clone())
    };

    let status = repo.accept(&transition_id, result)?;
    let output = AcceptOutput { status: status.to_string() };
    format::emit(ctx, &output, |o| println!("{}", o.status));
    Ok(())
}
