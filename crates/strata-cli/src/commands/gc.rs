use clap::Args;
use serde::Serialize;

use crate::context::Context;
use crate::format;

/// Garbage-collect unreachable objects, rejected transitions, and stale cache rows
#[derive(Args, Debug)]
pub struct GcArgs {
    /// Only delete rejected transitions older than this many seconds (0 = built-in default)
    #[arg(long, default_value_t = 0)]
    pub rejected_max_age_secs: u64,

    /// Report what would be deleted without deleting anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Serialize)]
struct GcOutput {
    objects_deleted: u64,
    bytes_reclaimed: u64,
    transitions_deleted: u64,
    intents_deleted: u64,
    states_deleted: u64,
    stat_cache_purged: u64,
}

pub fn run(ctx: &Context, args: &GcArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let report = repo.gc(args.rejected_max_age_secs, args.dry_run)?;
    let output = GcOutput {
        objects_deleted: report.objects_deleted,
        bytes_reclaimed: report.bytes_reclaimed,
        transitions_deleted: report.transitions_deleted,
        intents_deleted: report.intents_deleted,
        states_deleted: report.states_deleted,
        stat_cache_purged: report.stat_cache_purged,
    };
    format::emit(ctx, &output, |o| {
        println!(
            "objects: {} ({} bytes), transitions: {}, intents: {}, states: {}, stat cache rows: {}",
            o.objects_deleted, o.bytes_reclaimed, o.transitions_deleted, o.intents_deleted, o.states_deleted, o.stat_cache_purged
        );
    });
    Ok(())
}
