//! Jellymirror CLI - Command-line interface for the catalog mirror
//!
//! Provides commands for:
//! - Running a full or recently-added sync on demand
//! - Importing Playback Reporting plugin history
//! - Viewing the task run history
//! - Showing per-library statistics

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    history::HistoryCommand, import::ImportPluginCommand, stats::StatsCommand, sync::SyncCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "jellymirror",
    version,
    about = "Mirror a Jellyfin catalog into a local database"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Mirror libraries, items and users from the server
    Sync(SyncCommand),
    /// Import playback history from the Playback Reporting plugin
    ImportPlugin(ImportPluginCommand),
    /// Show recent task runs
    History(HistoryCommand),
    /// Show item, season and episode counts per library
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(config, format).await,
        Commands::ImportPlugin(cmd) => cmd.execute(config, format).await,
        Commands::History(cmd) => cmd.execute(config, format).await,
        Commands::Stats(cmd) => cmd.execute(config, format).await,
    }
}
