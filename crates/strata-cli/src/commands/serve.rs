use clap::Args;

/// Run a REST/JSON-RPC server over a repository (external collaborator, not implemented here)
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind, e.g. 127.0.0.1:7420
    #[arg(long, default_value = "127.0.0.1:7420")]
    pub bind: String,
}

pub fn run(_args: &ServeArgs) -> strata::Result<()> {
    eprintln!("strata serve: REST/JSON-RPC server is a thin skin over the library and is out of scope for this binary");
    std::process::exit(1);
}
