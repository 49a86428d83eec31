//! TaskLogger - durable run lifecycle over `ITaskLog`
//!
//! Opening a run must succeed for the run to exist, so `open_run` and
//! `conflicting_run` propagate errors. Everything recorded after that is
//! non-fatal: persistence errors are logged via `tracing::warn!` and never
//! propagated, so a failing task log cannot turn a finished run into a
//! crashed one.

use std::sync::Arc;

use chrono::Utc;
use jellymirror_core::{
    domain::{LogLine, RunId, TaskName, TaskRun, TaskState, TriggerType},
    ports::ITaskLog,
};

/// High-level service recording one `TaskRun` row per run
#[derive(Clone)]
pub struct TaskLogger {
    task_log: Arc<dyn ITaskLog>,
}

impl TaskLogger {
    pub fn new(task_log: Arc<dyn ITaskLog>) -> Self {
        Self { task_log }
    }

    // ========================================================================
    // Run lifecycle
    // ========================================================================

    /// Returns a `Running` run of any kind that excludes `name`
    pub async fn conflicting_run(&self, name: TaskName) -> anyhow::Result<Option<TaskRun>> {
        for other in name.conflicts() {
            if let Some(run) = self.task_log.running_run(*other).await? {
                return Ok(Some(run));
            }
        }
        Ok(None)
    }

    /// Inserts a fresh `Running` row and returns it
    pub async fn open_run(&self, name: TaskName, trigger: TriggerType) -> anyhow::Result<TaskRun> {
        let run = TaskRun::start(RunId::new(), name, trigger);
        self.task_log.insert_run(&run).await?;
        tracing::debug!(run_id = %run.id(), task = %name, trigger = %trigger, "Task run opened");
        Ok(run)
    }

    /// Moves `run` to its terminal state and persists it.
    ///
    /// The in-memory run is finished even when the update fails.
    pub async fn close_run(&self, run: &mut TaskRun, result: TaskState, lines: Vec<LogLine>) {
        if let Err(e) = run.finish(result, lines, Utc::now()) {
            tracing::warn!(run_id = %run.id(), error = %e, "Task run already closed");
            return;
        }
        if let Err(e) = self.task_log.update_run(run).await {
            tracing::warn!(run_id = %run.id(), error = %e, "Failed to persist task run result");
        }
    }

    // ========================================================================
    // Housekeeping and queries
    // ========================================================================

    /// Marks `Running` rows of `name` left by a previous process as failed
    pub async fn fail_stale_runs(&self, name: TaskName) -> u64 {
        match self.task_log.fail_stale_running(name).await {
            Ok(0) => 0,
            Ok(count) => {
                tracing::info!(task = %name, count, "Marked stale running task runs as failed");
                count
            }
            Err(e) => {
                tracing::warn!(task = %name, error = %e, "Failed to clean up stale task runs");
                0
            }
        }
    }

    pub async fn latest_run(&self, name: TaskName) -> anyhow::Result<Option<TaskRun>> {
        self.task_log.latest_run(name).await
    }

    pub async fn recent_runs(&self, limit: u32) -> anyhow::Result<Vec<TaskRun>> {
        self.task_log.recent_runs(limit).await
    }
}
