//! Task log port (driven/secondary port)
//!
//! Durable storage for [`TaskRun`] rows. The schedulers read it to decide
//! whether a tick may start a run; the engine writes one row per run.

use crate::domain::{RunId, TaskName, TaskRun};

#[async_trait::async_trait]
pub trait ITaskLog: Send + Sync {
    /// Persists a freshly started run
    async fn insert_run(&self, run: &TaskRun) -> anyhow::Result<()>;

    /// Overwrites result, duration and logged lines of an existing run
    async fn update_run(&self, run: &TaskRun) -> anyhow::Result<()>;

    async fn get_run(&self, id: RunId) -> anyhow::Result<Option<TaskRun>>;

    /// Most recent run of a kind, by start time
    async fn latest_run(&self, name: TaskName) -> anyhow::Result<Option<TaskRun>>;

    /// Any run of the kind still marked `Running`
    async fn running_run(&self, name: TaskName) -> anyhow::Result<Option<TaskRun>>;

    /// Marks `Running` rows of the kind as `Failed`; returns rows changed
    async fn fail_stale_running(&self, name: TaskName) -> anyhow::Result<u64>;

    /// Newest runs first
    async fn recent_runs(&self, limit: u32) -> anyhow::Result<Vec<TaskRun>>;
}
