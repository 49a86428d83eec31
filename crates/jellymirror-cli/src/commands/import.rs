//! Import-plugin command - Pull Playback Reporting history into the mirror

use std::path::Path;

use anyhow::Result;
use clap::Args;
use jellymirror_core::domain::{TaskName, TriggerType};

use super::{load_config, report_run, EngineHandle};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct ImportPluginCommand {}

impl ImportPluginCommand {
    pub async fn execute(&self, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let (_, config) = load_config(config_path);
        let handle = EngineHandle::open(&config).await?;

        formatter.notice("Checking for the Playback Reporting plugin...");
        let outcome = handle.engine.import_plugin_data(TriggerType::Manual).await;
        report_run(&handle, TaskName::PluginImport, outcome, formatter.as_ref()).await
    }
}
