//! gemstage - Ruby buildpack supply stage
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use gemstage::cli::{Cli, Commands, LogFormat};
use gemstage::config::ConfigManager;
use gemstage::error::SupplyResult;
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

fn init_logging(verbose: u8, format: LogFormat) {
    // 0 = warn, 1 = info, 2+ = debug
    let filter = match verbose {
        0 => EnvFilter::new("gemstage=warn"),
        1 => EnvFilter::new("gemstage=info"),
        _ => EnvFilter::new("gemstage=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.without_time().init(),
    }
}

async fn run() -> SupplyResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions(args) = cli.command {
        gemstage::cli::commands::completions(args);
        return Ok(());
    }

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = manager.load().await?;

    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.general.log_format));
    init_logging(cli.verbose, format);
    debug!("Using config {}", manager.path().display());

    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Supply(args) => gemstage::cli::commands::supply(args, &config).await,
        Commands::Fingerprint(args) => gemstage::cli::commands::fingerprint(args).await,
        Commands::Resolve(args) => gemstage::cli::commands::resolve(args).await,
        Commands::Config(args) => gemstage::cli::commands::config(args, &manager, &config).await,
    }
}
