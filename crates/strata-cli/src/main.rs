use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod context;
mod format;

use commands::{
    accept, budget, cat_file, commit, completion, diff, doctor, embed, evaluate, gc, history, info, init, lane, lanes, mcp, promote,
    propose, reject, remote, restore, search, semantic_search, serve, show, snapshot, status, template, trace, workspace,
};
use context::Context;

/// Content-addressed, agent-oriented version controller
///
/// strata stores immutable world states in a content-addressed object
/// store, links them with transitions recording why a change was proposed
/// and whether it was accepted, and organizes them into named lanes.
/// Workspaces materialize a state onto disk for an agent to work in;
/// `promote` moves a workspace's work into another lane using path-level
/// conflict detection, never a three-way content merge.
#[derive(Parser)]
#[command(name = "strata")]
#[command(version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the repository (default: discover upward from the current directory)
    #[arg(long, global = true, env = "STRATA_REPO")]
    repo: Option<PathBuf>,

    /// Emit a single JSON object on stdout instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Print only identifiers, suppress human summaries
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print full (un-truncated) hashes and ids
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository
    Init(init::InitArgs),
    /// Brief repository summary
    Status(status::StatusArgs),
    /// Snapshot a workspace's contents into a new state
    Snapshot(snapshot::SnapshotArgs),
    /// Record an intent and propose a transition
    Propose(propose::ProposeArgs),
    /// Accept a proposed transition
    Accept(accept::AcceptArgs),
    /// Reject a proposed transition
    Reject(reject::RejectArgs),
    /// Snapshot, propose, and accept in one step
    Commit(commit::CommitArgs),
    /// List transitions recorded against a lane
    History(history::HistoryArgs),
    /// Walk a state's accepted-transition ancestry
    Trace(trace::TraceArgs),
    /// Compare two states path-by-path
    Diff(diff::DiffArgs),
    /// Free-text search over intent prompts and tags
    Search(search::SearchArgs),
    /// List every lane
    Lanes(lanes::LanesArgs),
    /// Create or delete lanes
    #[command(subcommand)]
    Lane(lane::LaneCommands),
    /// List, create, remove, or update workspaces
    #[command(subcommand)]
    Workspace(workspace::WorkspaceCommands),
    /// Materialize a state into a workspace, overwriting its contents
    Restore(restore::RestoreArgs),
    /// Repository configuration and object store statistics
    Info(info::InfoArgs),
    /// Show a state or transition by id
    Show(show::ShowArgs),
    /// Move a workspace's staged work onto a target lane
    Promote(promote::PromoteArgs),
    /// Garbage-collect unreachable objects and stale history
    Gc(gc::GcArgs),
    /// Find and optionally recover workspaces left dirty by a crash
    Doctor(doctor::DoctorArgs),
    /// Dump a raw object by content hash
    #[command(name = "cat-file")]
    CatFile(cat_file::CatFileArgs),
    /// Run a REST/JSON-RPC server (out of scope for this binary)
    Serve(serve::ServeArgs),
    /// Run an MCP server (out of scope for this binary)
    Mcp(mcp::McpArgs),
    /// View or set a lane's budget limits
    #[command(subcommand)]
    Budget(budget::BudgetCommands),
    /// Save, list, apply, or delete workspace templates
    #[command(subcommand)]
    Template(template::TemplateCommands),
    /// Run configured evaluators against a workspace
    Evaluate(evaluate::EvaluateArgs),
    /// Record an embedding vector for an intent
    Embed(embed::EmbedArgs),
    /// Cosine-similarity search over intent embeddings
    #[command(name = "semantic-search")]
    SemanticSearch(semantic_search::SemanticSearchArgs),
    /// Push, pull, or check status against a remote (out of scope for this binary)
    #[command(subcommand)]
    Remote(remote::RemoteCommands),
    /// Print a shell completion script
    Completion(completion::CompletionArgs),
}

/// Initializes the `tracing` subscriber for the process: `RUST_LOG` wins if
/// set, otherwise `-v` raises the default level from `warn` to `debug`;
/// `--json` switches the event formatter to match the CLI's own `--json`
/// output convention. Diagnostics go to stderr so stdout stays reserved for
/// command output.
fn init_tracing(json: bool, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json, cli.verbose);
    let ctx = Context { repo_override: cli.repo, json: cli.json, quiet: cli.quiet, verbose: cli.verbose };

    let result = match cli.command {
        Commands::Init(args) => init::run(&ctx, &args),
        Commands::Status(args) => status::run(&ctx, &args),
        Commands::Snapshot(args) => snapshot::run(&ctx, &args),
        Commands::Propose(args) => propose::run(&ctx, &args),
        Commands::Accept(args) => accept::run(&ctx, &args),
        Commands::Reject(args) => reject::run(&ctx, &args),
        Commands::Commit(args) => commit::run(&ctx, &args),
        Commands::History(args) => history::run(&ctx, &args),
        Commands::Trace(args) => trace::run(&ctx, &args),
        Commands::Diff(args) => diff::run(&ctx, &args),
        Commands::Search(args) => search::run(&ctx, &args),
        Commands::Lanes(args) => lanes::run(&ctx, &args),
        Commands::Lane(cmd) => lane::run(&ctx, &cmd),
        Commands::Workspace(cmd) => workspace::run(&ctx, &cmd),
        Commands::Restore(args) => restore::run(&ctx, &args),
        Commands::Info(args) => info::run(&ctx, &args),
        Commands::Show(args) => show::run(&ctx, &args),
        Commands::Promote(args) => promote::run(&ctx, &args),
        Commands::Gc(args) => gc::run(&ctx, &args),
        Commands::Doctor(args) => doctor::run(&ctx, &args),
        Commands::CatFile(args) => cat_file::run(&ctx, &args),
        Commands::Serve(args) => serve::run(&args),
        Commands::Mcp(args) => mcp::run(&args),
        Commands::Budget(cmd) => budget::run(&ctx, &cmd),
        Commands::Template(cmd) => template::run(&ctx, &cmd),
        Commands::Evaluate(args) => evaluate::run(&ctx, &args),
        Commands::Embed(args) => embed::run(&ctx, &args),
        Commands::SemanticSearch(args) => semantic_search::run(&ctx, &args),
        Commands::Remote(cmd) => remote::run(&cmd),
        Commands::Completion(args) => {
            completion::run(&args);
            Ok(())
        }
    };

    if let Err(err) = result {
        format::print_error(&ctx, &err);
        std::process::exit(1);
    }
}
