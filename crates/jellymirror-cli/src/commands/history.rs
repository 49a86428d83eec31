//! History command - List recent task runs
//!
//! Provides the `jellymirror history` CLI command which reads the durable
//! task log and prints one row per run, newest first.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{load_config, EngineHandle};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Maximum number of runs to show
    #[arg(long, default_value = "20")]
    pub limit: u32,
}

impl HistoryCommand {
    pub async fn execute(&self, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let (_, config) = load_config(config_path);

        if !config.database.path.exists() {
            formatter.error("No database found. Run 'jellymirror sync' first.");
            return Ok(());
        }

        let logger = EngineHandle::task_logger(&config).await?;
        let runs = logger
            .recent_runs(self.limit)
            .await
            .context("Failed to query task runs")?;
        info!(count = runs.len(), "Retrieved task runs");

        formatter.history(&runs, self.limit);
        Ok(())
    }
}
