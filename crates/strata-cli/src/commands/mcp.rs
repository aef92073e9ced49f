use clap::Args;

/// Run an MCP server exposing repository operations to an agent (external collaborator, not implemented here)
#[derive(Args, Debug)]
pub struct McpArgs {}

pub fn run(_args: &McpArgs) -> strata::Result<()> {
    eprintln!("strata mcp: MCP server is a thin skin over the library and is out of scope for this binary");
    std::process::exit(1);
}
