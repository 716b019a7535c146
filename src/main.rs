//! Coon - dependency-aware build and package manager
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use coon::build::Controller;
use coon::cli::{commands, Cli, Commands};
use coon::config::ConfigManager;
use coon::error::{CoonError, CoonResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CoonResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("coon=warn"),
        1 => EnvFilter::new("coon=info"),
        _ => EnvFilter::new("coon=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let project_dir = match cli.project {
        Some(dir) => dir,
        None => current_dir()?,
    };

    // Create only writes a manifest, no config needed
    if let Commands::Create(args) = cli.command {
        return commands::create(args, &project_dir).await;
    }

    let config_manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    debug!("Using config {}", config_manager.path().display());
    let config = config_manager.load().await?;

    let controller = Controller::new(config, project_dir).await?;

    match cli.command {
        Commands::Create(_) => unreachable!("Create handled above"),
        Commands::Populate => commands::populate(&controller).await,
        Commands::Build => commands::build(&controller).await,
        Commands::Package => commands::package(&controller).await,
        Commands::Publish(args) => commands::publish(args, &controller).await,
        Commands::Fetch(args) => commands::fetch(args, &controller).await,
        Commands::Versions(args) => commands::versions(args, &controller).await,
    }
}

fn current_dir() -> CoonResult<PathBuf> {
    std::env::current_dir().map_err(|e| CoonError::io("getting current directory", e))
}
