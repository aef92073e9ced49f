use clap::Args;
use serde::Serialize;
use strata::ids::Hash;

use crate::context::Context;
use crate::format;

/// Dump a raw object's kind, size, and payload by content hash
#[derive(Args, Debug)]
pub struct CatFileArgs {
    /// Content hash of the object to print
    pub hash: String,

    /// Print the payload as raw bytes instead of attempting UTF-8 decoding
    #[arg(long)]
    pub raw: bool,
}

#[derive(Serialize)]
struct CatFileOutput {
    hash: String,
    kind: String,
    size: u64,
    payload: String,
}

pub fn run(ctx: &Context, args: &CatFileArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let hash: Hash = args.hash.parse()?;
    let object = repo
        .store()
        .get(&hash)?
        .ok_or_else(|| strata::StrataError::NotFound { kind: "object".to_owned(), id: hash.to_string() })?;

    if args.raw && !ctx.json {
        use std::io::Write;
        std::io::stdout().write_all(&object.payload).ok();
        return Ok(());
    }

    let payload = String::from_utf8_lossy(&object.payload).into_owned();
    let output = CatFileOutput { hash: hash.to_string(), kind: object.kind.to_string(), size: object.size, payload };
    format::emit(ctx, &output, |o| {
        println!("{} {} ({} bytes)", o.kind, ctx.short(&o.hash), o.size);
        println!("{}", o.payload);
    });
    Ok(())
}
