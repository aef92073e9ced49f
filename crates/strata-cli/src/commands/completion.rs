use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};

use crate::Cli;

/// Print a shell completion script to stdout
#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

pub fn run(args: &CompletionArgs) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_owned();
    generate(args.shell, &mut cmd, name, &mut std::io::stdout());
}
