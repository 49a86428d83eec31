//! Task scheduler - starts full and partial syncs on a fixed interval
//!
//! Each [`TaskScheduler`] owns one task kind. It wakes every
//! `poll_seconds`, reads the task log and starts a scheduled run when:
//!
//! - no run of a conflicting kind is `Running`, and
//! - the latest run of its own kind is older than `interval_minutes`
//!   (or there is none).
//!
//! ```text
//! interval tick ──→ task log check ──→ ReconciliationEngine::run_task
//!        ▲                                        │
//!        └──────────── next tick ◀────────────────┘
//! ```
//!
//! The task-log check is advisory: two processes can both pass it before
//! either inserts its row. Within one process the engine's run guard
//! rejects the second start.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jellymirror_core::config::{Config, TaskSchedule};
use jellymirror_core::domain::{TaskName, TaskRun, TriggerType};

use crate::engine::ReconciliationEngine;
use crate::SyncError;

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not due, or blocked by a running task
    Skipped,
    Succeeded,
    Failed,
}

/// Decides whether a tick may start a run
pub fn should_run(
    latest: Option<&TaskRun>,
    conflicting_running: bool,
    interval: Duration,
    now: DateTime<Utc>,
) -> bool {
    if conflicting_running {
        return false;
    }
    match latest {
        None => true,
        Some(run) if run.is_running() => false,
        Some(run) => now - run.time_run() >= interval,
    }
}

pub struct TaskScheduler {
    engine: Arc<ReconciliationEngine>,
    task: TaskName,
    interval: Duration,
    poll_interval: StdDuration,
}

impl TaskScheduler {
    pub fn new(engine: Arc<ReconciliationEngine>, task: TaskName, schedule: TaskSchedule) -> Self {
        Self {
            engine,
            task,
            interval: Duration::minutes(i64::from(schedule.interval_minutes)),
            poll_interval: StdDuration::from_secs(u64::from(schedule.poll_seconds.max(1))),
        }
    }

    pub fn full_sync(engine: Arc<ReconciliationEngine>, config: &Config) -> Self {
        Self::new(engine, TaskName::FullSync, config.tasks.full_sync)
    }

    pub fn partial_sync(engine: Arc<ReconciliationEngine>, config: &Config) -> Self {
        Self::new(engine, TaskName::PartialSync, config.tasks.partial_sync)
    }

    pub fn task(&self) -> TaskName {
        self.task
    }

    /// Checks the task log once and runs the task when it is due
    pub async fn tick(&self) -> TickOutcome {
        // Nothing is recorded until a server is configured
        if !self.engine.is_configured() {
            debug!(task = %self.task, "No Jellyfin server configured, skipping tick");
            return TickOutcome::Skipped;
        }

        let logger = self.engine.task_logger();

        let latest = match logger.latest_run(self.task).await {
            Ok(run) => run,
            Err(e) => {
                warn!(task = %self.task, error = %e, "Failed to read latest task run");
                return TickOutcome::Skipped;
            }
        };
        let conflicting = match logger.conflicting_run(self.task).await {
            Ok(run) => run.is_some(),
            Err(e) => {
                warn!(task = %self.task, error = %e, "Failed to check for running tasks");
                return TickOutcome::Skipped;
            }
        };

        if !should_run(latest.as_ref(), conflicting, self.interval, Utc::now())
            || self.engine.is_busy()
        {
            return TickOutcome::Skipped;
        }

        info!(task = %self.task, "Starting scheduled run");
        match self.engine.run_task(self.task, TriggerType::Scheduled).await {
            Ok(report) => {
                debug!(run_id = %report.run.id(), task = %self.task, "Scheduled run finished");
                TickOutcome::Succeeded
            }
            Err(SyncError::ConcurrentRunConflict { .. }) => TickOutcome::Skipped,
            Err(e) => {
                warn!(task = %self.task, error = %e, "Scheduled run failed");
                TickOutcome::Failed
            }
        }
    }

    /// Ticks until `shutdown` is cancelled.
    ///
    /// Stale `Running` rows of this kind are failed first. A run in progress
    /// when shutdown is requested finishes before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            task = %self.task,
            interval_minutes = self.interval.num_minutes(),
            poll_secs = self.poll_interval.as_secs(),
            "Task scheduler starting"
        );

        self.engine.task_logger().fail_stale_runs(self.task).await;

        let mut poll_timer = tokio::time::interval(self.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(task = %self.task, "Shutdown requested");
                    break;
                }
                _ = poll_timer.tick() => {
                    self.tick().await;
                }
            }
        }

        info!(task = %self.task, "Task scheduler stopped");
    }
}
