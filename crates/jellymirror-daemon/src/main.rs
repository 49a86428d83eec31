//! Jellymirror Daemon - Background catalog mirroring service
//!
//! This binary runs as a user service and handles:
//! - Scheduled full and recently-added syncs against one Jellyfin server
//! - Cleanup of runs left `Running` by a previous process
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon opens the mirror database, wires a [`ReconciliationEngine`]
//! and spawns one [`TaskScheduler`] per scheduled task kind. Every
//! scheduler shares a `CancellationToken` that is cancelled on receipt of
//! SIGTERM or SIGINT; a run in progress finishes before its scheduler exits.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use jellymirror_audit::TracingProgressSink;
use jellymirror_cache::{DatabasePool, SqliteCatalogStore};
use jellymirror_client::{JellyfinClient, JellyfinMediaSource};
use jellymirror_core::{
    config::Config,
    ports::{ICatalogStore, IMediaSource, IProgressSink, ITaskLog},
};
use jellymirror_sync::{engine::SyncSettings, ReconciliationEngine, TaskScheduler};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "JELLYMIRROR_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service that owns the engine and its schedulers
struct DaemonService {
    config: Config,
    engine: Arc<ReconciliationEngine>,
    /// Token for signalling graceful shutdown to all schedulers
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the database and builds the engine from `config`
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open database")?;
        let store = Arc::new(SqliteCatalogStore::new(db_pool.pool().clone()));

        let source = build_media_source(&config)?;
        if source.is_none() {
            warn!(
                "Jellyfin server URL or API key not configured; \
                 scheduled runs will fail until both are set"
            );
        }

        let engine = Arc::new(ReconciliationEngine::new(
            source,
            Arc::clone(&store) as Arc<dyn ICatalogStore>,
            store as Arc<dyn ITaskLog>,
            Arc::new(TracingProgressSink) as Arc<dyn IProgressSink>,
            SyncSettings::from_config(&config),
        ));

        Ok(Self {
            config,
            engine,
            shutdown,
        })
    }

    /// Runs both schedulers until shutdown is requested
    async fn run(&self) -> Result<()> {
        let schedulers = [
            TaskScheduler::full_sync(Arc::clone(&self.engine), &self.config),
            TaskScheduler::partial_sync(Arc::clone(&self.engine), &self.config),
        ];

        let mut tasks = JoinSet::new();
        for scheduler in schedulers {
            let token = self.shutdown.child_token();
            tasks.spawn(async move { scheduler.run(token).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Scheduler task panicked");
                self.shutdown.cancel();
            }
        }

        Ok(())
    }
}

/// Builds the Jellyfin media source when both URL and API key are set
fn build_media_source(config: &Config) -> Result<Option<Arc<dyn IMediaSource>>> {
    let Some((url, api_key)) = config.server_credentials() else {
        return Ok(None);
    };
    let client = JellyfinClient::new(
        url,
        api_key,
        Duration::from_secs(config.server.timeout_secs),
    )
    .context("Failed to create Jellyfin client")?;
    info!(server = %client.base_url(), "Jellyfin client ready");
    Ok(Some(Arc::new(JellyfinMediaSource::new(client))))
}

/// Configuration path from `JELLYMIRROR_CONFIG`, else the platform default
fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path();
    let config = Config::load_or_default(&config_path);

    // RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!(config_path = %config_path.display(), "Jellymirror daemon starting (jellymirrord)");

    for issue in config.validate() {
        warn!(field = %issue.field, "{}", issue.message);
    }

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;

    let result = service.run().await;

    match &result {
        Ok(()) => info!("Jellymirror daemon shut down gracefully"),
        Err(e) => error!(error = %e, "Jellymirror daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
