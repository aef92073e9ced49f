use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::context::Context;
use crate::format;

/// Repository configuration and aggregate object store statistics
#[derive(Args, Debug)]
pub struct InfoArgs {}

#[derive(Serialize)]
struct InfoOutput {
    version: String,
    default_lane: String,
    max_blob_size: i64,
    max_tree_depth: i64,
    blob_threshold: i64,
    evaluator_count: usize,
    total_objects: u64,
    total_bytes: u64,
    by_kind: BTreeMap<String, u64>,
}

pub fn run(ctx: &Context, _args: &InfoArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let config = repo.config();
    let stats = repo.store().stats()?;
    let output = InfoOutput {
        version: config.version.clone(),
        default_lane: config.default_lane.clone(),
        max_blob_size: config.max_blob_size,
        max_tree_depth: config.max_tree_depth,
        blob_threshold: config.blob_threshold,
        evaluator_count: config.evaluators.len(),
        total_objects: stats.total_objects,
        total_bytes: stats.total_bytes,
        by_kind: stats.by_kind,
    };
    format::emit(ctx, &output, |o| {
        println!("version: {}", o.version);
        println!("default lane: {}", o.default_lane);
        println!("evaluators: {}", o.evaluator_count);
        println!("objects: {} ({} bytes)", o.total_objects, o.total_bytes);
        for (kind, count) in &o.by_kind {
            println!("  {kind}: {count}");
        }
    });
    Ok(())
}
