//! Output helpers: JSON envelopes for `--json`, short summaries otherwise.

use serde::Serialize;

use crate::context::Context;

/// Prints `value` as a single JSON object if `--json` was passed, otherwise
/// hands it to `human` for a prose rendering.
pub fn emit<T: Serialize>(ctx: &Context, value: &T, human: impl FnOnce(&T)) {
    if ctx.json {
        match serde_json::to_string(value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("{{\"error\": \"failed to serialize output: {e}\"}}"),
        }
    } else {
        human(value);
    }
}

/// Prints a handled error as `{"error": "..."}` (JSON mode) or a plain
/// stderr line.
pub fn print_error(ctx: &Context, err: &strata::StrataError) {
    if ctx.json {
        let obj = serde_json::json!({ "error": err.to_string() });
        eprintln!("{obj}");
    } else {
        eprintln!("error: {err}");
    }
}
