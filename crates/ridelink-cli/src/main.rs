//! Ridelink CLI entry point

use clap::Parser;
use tracing::{error, info};

use ridelink_cli::{cli::Cli, commands::CommandDispatcher, config::CliAppConfig, error::Result};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration before logging so the config file can turn on verbose output
    let config = load_configuration(&cli)?;

    // Initialize logging
    setup_logging(cli.verbose || config.cli.verbose);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from: {}", path);
    }

    // Execute the command
    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from the given file or the standard layers
fn load_configuration(cli: &Cli) -> Result<CliAppConfig> {
    let config = match &cli.config {
        Some(path) => CliAppConfig::load_from_file(path)?,
        None => CliAppConfig::load()?,
    };
    Ok(config)
}
