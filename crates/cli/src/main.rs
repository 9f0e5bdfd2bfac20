//! Rentwise CLI
//!
//! Requests narrative analyses of rental finances and bookings from the
//! remote analysis service, with a local summary when it is unavailable.

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::RentwiseConfig;

/// Rentwise CLI: narrative analysis for vacation-rental records.
#[derive(Parser, Debug)]
#[command(name = "rentwise", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "RENTWISE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request an analysis from the remote service.
    Analyze(commands::analyze::AnalyzeArgs),
    /// Print the locally computed summary.
    Local(commands::local::LocalArgs),
    /// Sanitize an HTML narrative.
    Sanitize(commands::sanitize::SanitizeArgs),
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RentwiseConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze(args) => commands::analyze::run(&config, &args, &cli.format).await,
        Command::Local(args) => {
            commands::local::run(&config, &args, &cli.format).map(|()| ExitCode::SUCCESS)
        }
        Command::Sanitize(args) => {
            commands::sanitize::run(&args, &cli.format).map(|()| ExitCode::SUCCESS)
        }
        Command::Config => commands::config::run(&config, &cli.format).map(|()| ExitCode::SUCCESS),
    }
}
