use clap::{Args, Subcommand};

/// Push, pull, or check status against a remote object store (external collaborator, not implemented here)
#[derive(Subcommand, Debug)]
pub enum RemoteCommands {
    Push(RemotePushArgs),
    Pull(RemotePullArgs),
    Status(RemoteStatusArgs),
}

#[derive(Args, Debug)]
pub struct RemotePushArgs {
    pub remote: String,
}

#[derive(Args, Debug)]
pub struct RemotePullArgs {
    pub remote: String,
}

#[derive(Args, Debug)]
pub struct RemoteStatusArgs {
    pub remote: String,
}

pub fn run(_cmd: &RemoteCommands) -> strata::Result<()> {
    eprintln!("strata remote: remote object sync is a thin skin over the store's capability set and is out of scope for this binary");
    std::process::exit(1);
}
