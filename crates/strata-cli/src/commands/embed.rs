use clap::Args;
use serde::Serialize;
use strata::ids::IntentId;

use crate::context::Context;
use crate::format;

/// Record an embedding vector for an intent, for later querying by
/// `semantic-search`
#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Intent to attach the vector to
    pub intent: String,

    /// Comma-separated vector components, e.g. "0.1,0.4,-0.2"
    #[arg(long)]
    pub vector: String,

    /// Name of the embedding model that produced the vector
    #[arg(long)]
    pub model: String,
}

#[derive(Serialize)]
struct EmbedOutput {
    intent: String,
    dimensions: usize,
}

pub fn run(ctx: &Context, args: &EmbedArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let intent_id: IntentId = args.intent.parse()?;
    let vector = parse_vector(&args.vector)?;
    repo.embed_intent(&intent_id, &vector, &args.model)?;
    let output = EmbedOutput { intent: intent_id.to_string(), dimensions: vector.len() };
    format::emit(ctx, &output, |o| {
        println!("recorded {}-dimensional embedding for {}", o.dimensions, ctx.short(&o.intent));
    });
    Ok(())
}

fn parse_vector(s: &str) -> strata::Result<Vec<f32>> {
    s.split(',')
        .map(|part| {
            part.trim().parse::<f32>().map_err(|e| strata::StrataError::InvalidName {
                name: s.to_owned(),
                reason: format!("not a valid vector component: {e}"),
            })
        })
        .collect()
}
