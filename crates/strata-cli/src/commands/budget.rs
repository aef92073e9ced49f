use clap::{Args, Subcommand};
use serde::Serialize;
use strata::ids::LaneName;
use strata::model::BudgetConfig;

use crate::context::Context;
use crate::format;

/// View or set a lane's budget limits
#[derive(Subcommand, Debug)]
pub enum BudgetCommands {
    /// Show a lane's configured limits and spend so far
    Get(BudgetGetArgs),
    /// Replace a lane's configured limits
    Set(BudgetSetArgs),
}

#[derive(Args, Debug)]
pub struct BudgetGetArgs {
    /// Lane to inspect
    #[arg(default_value = "main")]
    pub lane: String,
}

#[derive(Args, Debug)]
pub struct BudgetSetArgs {
    /// Lane to configure
    pub lane: String,

    #[arg(long)]
    pub max_tokens_in: Option<u64>,
    #[arg(long)]
    pub max_tokens_out: Option<u64>,
    #[arg(long)]
    pub max_api_calls: Option<u64>,
    #[arg(long)]
    pub max_wall_time_ms: Option<u64>,
    #[arg(long, default_value_t = 90)]
    pub alert_threshold_pct: u8,
}

#[derive(Serialize)]
struct BudgetOutput {
    lane: String,
    max_tokens_in: Option<u64>,
    max_tokens_out: Option<u64>,
    max_api_calls: Option<u64>,
    max_wall_time_ms: Option<u64>,
    alert_threshold_pct: u8,
    spent_tokens_in: u64,
    spent_tokens_out: u64,
    spent_api_calls: u64,
    spent_wall_time_ms: u64,
}

pub fn run(ctx: &Context, cmd: &BudgetCommands) -> strata::Result<()> {
    let repo = ctx.open()?;
    match cmd {
        BudgetCommands::Get(args) => {
            let name = LaneName::new(args.lane.clone())?;
            let lane = repo
                .world_state()
                .get_lane(repo.store(), &name)?
                .ok_or_else(|| strata::StrataError::NotFound { kind: "lane".to_owned(), id: name.to_string() })?;
            let output = BudgetOutput {
                lane: lane.name.to_string(),
                max_tokens_in: lane.budget.max_tokens_in,
                max_tokens_out: lane.budget.max_tokens_out,
                max_api_calls: lane.budget.max_api_calls,
                max_wall_time_ms: lane.budget.max_wall_time_ms,
                alert_threshold_pct: lane.budget.alert_threshold_pct,
                spent_tokens_in: lane.spent.tokens_in,
                spent_tokens_out: lane.spent.tokens_out,
                spent_api_calls: lane.spent.api_calls,
                spent_wall_time_ms: lane.spent.wall_time_ms,
            };
            format::emit(ctx, &output, print_budget);
        }
        BudgetCommands::Set(args) => {
            let name = LaneName::new(args.lane.clone())?;
            let budget = BudgetConfig {
                max_tokens_in: args.max_tokens_in,
                max_tokens_out: args.max_tokens_out,
                max_api_calls: args.max_api_calls,
                max_wall_time_ms: args.max_wall_time_ms,
                alert_threshold_pct: args.alert_threshold_pct,
            };
            repo.world_state().set_lane_budget(repo.store(), &name, &budget)?;
            println!("updated budget for lane '{name}'");
        }
    }
    Ok(())
}

fn print_budget(o: &BudgetOutput) {
    println!("lane: {}", o.lane);
    println!(
        "  limits: tokens_in={:?} tokens_out={:?} api_calls={:?} wall_time_ms={:?} (alert at {}%)",
        o.max_tokens_in, o.max_tokens_out, o.max_api_calls, o.max_wall_time_ms, o.alert_threshold_pct
    );
    println!(
        "  spent: tokens_in={} tokens_out={} api_calls={} wall_time_ms={}",
        o.spent_tokens_in, o.spent_tokens_out, o.spent_api_calls, o.spent_wall_time_ms
    );
}
