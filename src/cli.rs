use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// autopart - Automatic partition layout planner
#[derive(Parser)]
#[command(name = "autopart")]
#[command(about = "Plans a partition layout for an unattended Linux installation")]
#[command(version)]
pub struct Cli {
    /// Log planner decisions (search sizes, strategies per disk).
    ///
    /// RUST_LOG overrides this when set.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan a layout for a request file
    Plan {
        /// Path to the JSON plan request
        request: PathBuf,

        /// Print the layout as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Never shrink Windows partitions, ignoring probed estimates
        #[arg(long)]
        no_shrink: bool,
    },
    /// Validate a request file
    Validate {
        /// Path to the JSON plan request
        request: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
