//! autopart - Main entry point
//!
//! Loads a plan request, validates it and prints the planned layout.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use autopart::cli::{Cli, Commands};
use autopart::{plan_layout, NoShrink, PlanRequest, ProbedShrinkOracle, ShrinkOracle};

/// Initialize the tracing subscriber; RUST_LOG overrides the default level
fn init_logger(verbose: bool) {
    let default = if verbose { "autopart=debug" } else { "autopart=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load(path: &Path) -> Result<PlanRequest> {
    let request = PlanRequest::load_from_file(path)?;
    request
        .validate()
        .with_context(|| format!("Invalid plan request {:?}", path))?;
    Ok(request)
}

fn run_plan(path: &Path, json: bool, no_shrink: bool) -> Result<()> {
    let request = load(path)?;
    info!(
        disks = request.disks.len(),
        partitions = request.partitions.len(),
        "planning layout"
    );

    let oracle: &dyn ShrinkOracle = if no_shrink { &NoShrink } else { &ProbedShrinkOracle };
    let layout = plan_layout(&request.disks, &request.partitions, &request.options, oracle)?;

    if json {
        println!("{}", layout.to_json()?);
    } else {
        println!("{}", layout.summary());
    }
    Ok(())
}

/// Main application entry point
fn main() {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    debug!("CLI arguments parsed");

    let result = match cli.command {
        Commands::Plan { request, json, no_shrink } => run_plan(&request, json, no_shrink),
        Commands::Validate { request } => load(&request).map(|_| {
            println!("✓ Plan request is valid: {:?}", request);
        }),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}
