//! Command-line interface definitions.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "sync-worktrees",
    version,
    about = "Mirror a remote's branches into local Git worktrees"
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "sync-worktrees.toml")]
    pub config: PathBuf,

    /// Run a single synchronization pass for every repository, then exit.
    #[arg(long)]
    pub once: bool,

    /// Only operate on the repository with this name.
    #[arg(long)]
    pub repo: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
