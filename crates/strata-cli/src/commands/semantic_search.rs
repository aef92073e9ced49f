use clap::Args;
use serde::Serialize;

use crate::context::Context;
use crate::format;

/// Cosine-similarity search over intent embeddings
///
/// Queries vectors recorded via `strata embed`; the embedding model call
/// that produces a vector from a prompt stays outside this binary.
#[derive(Args, Debug)]
pub struct SemanticSearchArgs {
    /// Comma-separated query vector components, e.g. "0.1,0.4,-0.2"
    #[arg(long)]
    pub vector: String,

    /// Maximum number of results
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Serialize)]
struct SemanticHit {
    intent: String,
    prompt: String,
    score: f32,
}

pub fn run(ctx: &Context, args: &SemanticSearchArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let vector = parse_vector(&args.vector)?;
    let hits: Vec<SemanticHit> = repo
        .search_similar_intents(&vector, args.limit)?
        .into_iter()
        .map(|(intent, score)| SemanticHit { intent: intent.id.to_string(), prompt: intent.prompt, score })
        .collect();
    format::emit(ctx, &hits, |hits| {
        for h in hits {
            println!("{:.4} {} {}", h.score, ctx.short(&h.intent), h.prompt);
        }
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
