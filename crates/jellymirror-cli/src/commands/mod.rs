//! Subcommands and the engine wiring they share

pub mod history;
pub mod import;
pub mod stats;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jellymirror_audit::{BroadcastProgressSink, TaskLogger};
use jellymirror_cache::{DatabasePool, SqliteCatalogStore};
use jellymirror_client::{JellyfinClient, JellyfinMediaSource};
use jellymirror_core::config::Config;
use jellymirror_core::domain::TaskName;
use jellymirror_core::ports::{ICatalogStore, IMediaSource, IProgressSink, ITaskLog};
use jellymirror_sync::engine::SyncSettings;
use jellymirror_sync::{ReconciliationEngine, RunReport};
use tracing::info;

use crate::output::OutputFormatter;

/// Loads the configuration from `path` or the platform default
pub fn load_config(path: Option<&Path>) -> (PathBuf, Config) {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&path);
    info!(config_path = %path.display(), "Loaded configuration");
    (path, config)
}

/// An engine over the configured server and database
pub struct EngineHandle {
    pub engine: ReconciliationEngine,
    pub progress: BroadcastProgressSink,
}

impl EngineHandle {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open database")?;
        let store = Arc::new(SqliteCatalogStore::new(pool.pool().clone()));

        let source: Option<Arc<dyn IMediaSource>> = match config.server_credentials() {
            Some((url, api_key)) => {
                let client = JellyfinClient::new(
                    url,
                    api_key,
                    Duration::from_secs(config.server.timeout_secs),
                )
                .context("Failed to create Jellyfin client")?;
                Some(Arc::new(JellyfinMediaSource::new(client)))
            }
            None => None,
        };

        let progress = BroadcastProgressSink::new();
        let engine = ReconciliationEngine::new(
            source,
            Arc::clone(&store) as Arc<dyn ICatalogStore>,
            store as Arc<dyn ITaskLog>,
            Arc::new(progress.clone()) as Arc<dyn IProgressSink>,
            SyncSettings::from_config(config),
        );

        Ok(Self { engine, progress })
    }

    /// Opens only the store, for read-only commands
    pub async fn store(config: &Config) -> Result<SqliteCatalogStore> {
        let pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open database")?;
        Ok(SqliteCatalogStore::new(pool.pool().clone()))
    }

    pub async fn task_logger(config: &Config) -> Result<TaskLogger> {
        let store = Arc::new(Self::store(config).await?);
        Ok(TaskLogger::new(store as Arc<dyn ITaskLog>))
    }
}

/// Prints the outcome of one engine run in either format
///
/// On failure the run row is re-read so its log lines can be shown.
pub async fn report_run(
    handle: &EngineHandle,
    task: TaskName,
    outcome: Result<RunReport, jellymirror_sync::SyncError>,
    formatter: &dyn OutputFormatter,
) -> Result<()> {
    match outcome {
        Ok(report) => {
            formatter.run(&report.run, Some(&report));
            Ok(())
        }
        Err(err) => {
            // Rejected runs never open a row
            if !matches!(err, jellymirror_sync::SyncError::ConcurrentRunConflict { .. }) {
                if let Some(run) = handle.engine.task_logger().latest_run(task).await? {
                    formatter.run(&run, None);
                }
            }
            formatter.error(&err.to_string());
            Err(err).with_context(|| format!("{} failed", task.label()))
        }
    }
}
