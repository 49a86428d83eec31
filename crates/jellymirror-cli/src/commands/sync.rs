//! Sync command - Mirror the Jellyfin catalog
//!
//! Provides the `jellymirror sync` CLI command which:
//! 1. Loads configuration and opens the database
//! 2. Creates the Jellyfin client and the reconciliation engine
//! 3. Runs a full (default) or recently-added (`--partial`) sync
//! 4. Streams progress while running and prints the run log

use std::future::Future;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use jellymirror_audit::ProgressMessage;
use jellymirror_core::domain::{TaskName, TriggerType};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tracing::debug;

use super::{load_config, report_run, EngineHandle};
use crate::output::{get_formatter, OutputFormat};

/// Sync command options
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Only add records changed inside the recent window
    #[arg(long)]
    pub partial: bool,
}

impl SyncCommand {
    pub fn task(&self) -> TaskName {
        if self.partial {
            TaskName::PartialSync
        } else {
            TaskName::FullSync
        }
    }

    pub async fn execute(&self, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let (_, config) = load_config(config_path);
        let handle = EngineHandle::open(&config).await?;
        let task = self.task();

        formatter.notice(&format!("Starting {}...", task.label()));

        let mut events = handle.progress.subscribe();
        let run = async {
            match task {
                TaskName::PartialSync => handle.engine.partial_sync(TriggerType::Manual).await,
                _ => handle.engine.full_sync(TriggerType::Manual).await,
            }
        };
        let outcome = echo_progress(run, &mut events, |m| formatter.progress(m)).await;

        report_run(&handle, task, outcome, formatter.as_ref()).await
    }
}

/// Drives `run` to completion while echoing every progress event
///
/// Events still buffered when `run` returns are drained before returning,
/// so the terminal success or error event is always shown.
async fn echo_progress<F: Future>(
    run: F,
    events: &mut Receiver<ProgressMessage>,
    mut echo: impl FnMut(&ProgressMessage),
) -> F::Output {
    tokio::pin!(run);

    let output = loop {
        tokio::select! {
            output = &mut run => break output,
            received = events.recv() => match received {
                Ok(message) => echo(&message),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Progress echo fell behind");
                }
                Err(RecvError::Closed) => break (&mut run).await,
            },
        }
    };

    loop {
        match events.try_recv() {
            Ok(message) => echo(&message),
            Err(TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "Progress echo fell behind");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use jellymirror_audit::BroadcastProgressSink;
    use jellymirror_core::domain::{ProgressEvent, ProgressKind};
    use jellymirror_core::ports::IProgressSink;

    #[test]
    fn test_partial_flag_selects_task() {
        assert_eq!(SyncCommand { partial: false }.task(), TaskName::FullSync);
        assert_eq!(SyncCommand { partial: true }.task(), TaskName::PartialSync);
    }

    #[tokio::test]
    async fn test_terminal_event_is_echoed() {
        let sink = BroadcastProgressSink::new();
        let mut events = sink.subscribe();

        // Publishes its last event right before finishing, with no await in between
        let run = async {
            sink.send("FullSyncTask", ProgressEvent::new(ProgressKind::Start, "Started"));
            tokio::task::yield_now().await;
            sink.send("FullSyncTask", ProgressEvent::new(ProgressKind::Update, "Syncing... 1/4"));
            sink.send("FullSyncTask", ProgressEvent::new(ProgressKind::Success, "Manual Sync Completed"));
            42
        };

        let mut seen = Vec::new();
        let output = echo_progress(run, &mut events, |m| seen.push(m.event.message.clone())).await;

        assert_eq!(output, 42);
        assert_eq!(
            seen,
            vec!["Started", "Syncing... 1/4", "Manual Sync Completed"]
        );
    }
}
