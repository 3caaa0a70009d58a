// callplan-cli/src/cli.rs
use std::path::PathBuf;

use clap::Parser;

/// Plan and execute tool calls for natural-language requests.
#[derive(Parser, Debug)]
#[command(name = "callplan", version, about)]
pub struct Cli {
    /// Path to the configuration file. Defaults to searching for
    /// Callplan.toml upward from the current directory.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Process a single request and exit instead of starting the
    /// interactive loop.
    #[arg(long, short)]
    pub query: Option<String>,

    /// Print the executed call tree as JSON alongside the output.
    #[arg(long)]
    pub show_calls: bool,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
