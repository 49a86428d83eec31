//! Stats command - Per-library counters from the last statistics refresh

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{load_config, EngineHandle};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn execute(&self, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let (_, config) = load_config(config_path);

        if !config.database.path.exists() {
            formatter.error("No database found. Run 'jellymirror sync' first.");
            return Ok(());
        }

        let store = EngineHandle::store(&config).await?;
        let stats = store
            .library_stats()
            .await
            .context("Failed to query library statistics")?;
        info!(libraries = stats.len(), "Retrieved library statistics");

        formatter.stats(&stats);
        Ok(())
    }
}
