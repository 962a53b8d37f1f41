//! regcache - build definition and README cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use regcache::cli::args::LogFormat;
use regcache::cli::{Cli, Commands};
use regcache::config::ConfigManager;
use regcache::error::RegcacheResult;
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

async fn run() -> RegcacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("regcache=warn"),
        1 => EnvFilter::new("regcache=info"),
        _ => EnvFilter::new("regcache=debug"),
    };

    let json = match cli.log_format {
        Some(format) => format == LogFormat::Json,
        None => config.general.log_format == "json",
    };

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }

    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Sync(args) => regcache::cli::commands::sync(args, &config).await,
        Commands::Index(args) => regcache::cli::commands::index(args, &config).await,
        Commands::Show(args) => regcache::cli::commands::show(args, &config).await,
        Commands::Config(args) => {
            regcache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
