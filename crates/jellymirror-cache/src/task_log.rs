//! SQLite implementation of ITaskLog
//!
//! Task runs live in the same database as the catalog so that the
//! schedulers of every process sharing the file see each other's
//! `Running` rows.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use jellymirror_core::domain::{LogLine, RunId, TaskName, TaskRun, TaskState, TriggerType};
use jellymirror_core::ports::ITaskLog;

use crate::repository::{format_datetime, parse_datetime, SqliteCatalogStore};
use crate::CacheError;

fn task_run_from_row(row: &SqliteRow) -> Result<TaskRun, CacheError> {
    let id: String = row.try_get("id")?;
    let name: String = row.try_get("name")?;
    let trigger: String = row.try_get("trigger_type")?;
    let result: String = row.try_get("result")?;
    let time_run: String = row.try_get("time_run")?;
    let logged_data: String = row.try_get("logged_data")?;

    let serialization = |e: jellymirror_core::domain::DomainError| {
        CacheError::SerializationError(e.to_string())
    };
    let lines: Vec<LogLine> = serde_json::from_str(&logged_data)
        .map_err(|e| CacheError::SerializationError(format!("Invalid logged_data: {}", e)))?;

    Ok(TaskRun::restore(
        RunId::from_str(&id).map_err(serialization)?,
        TaskName::from_str(&name).map_err(serialization)?,
        TriggerType::from_str(&trigger).map_err(serialization)?,
        TaskState::from_str(&result).map_err(serialization)?,
        parse_datetime(&time_run)?,
        row.try_get("duration_ms")?,
        lines,
    ))
}

fn encode_lines(run: &TaskRun) -> Result<String, CacheError> {
    serde_json::to_string(run.logged_data())
        .map_err(|e| CacheError::SerializationError(e.to_string()))
}

#[async_trait::async_trait]
impl ITaskLog for SqliteCatalogStore {
    async fn insert_run(&self, run: &TaskRun) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO task_runs (id, name, trigger_type, result, time_run, duration_ms, \
             logged_data) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.id().to_string())
        .bind(run.name().as_str())
        .bind(run.trigger().as_str())
        .bind(run.result().as_str())
        .bind(format_datetime(&run.time_run()))
        .bind(run.duration_ms())
        .bind(encode_lines(run)?)
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;
        Ok(())
    }

    async fn update_run(&self, run: &TaskRun) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE task_runs SET result = ?, duration_ms = ?, logged_data = ? WHERE id = ?",
        )
        .bind(run.result().as_str())
        .bind(run.duration_ms())
        .bind(encode_lines(run)?)
        .bind(run.id().to_string())
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        if result.rows_affected() == 0 {
            anyhow::bail!("task run {} not found", run.id());
        }
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> anyhow::Result<Option<TaskRun>> {
        let row = sqlx::query("SELECT * FROM task_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(row.as_ref().map(task_run_from_row).transpose()?)
    }

    async fn latest_run(&self, name: TaskName) -> anyhow::Result<Option<TaskRun>> {
        let row = sqlx::query(
            "SELECT * FROM task_runs WHERE name = ? ORDER BY time_run DESC LIMIT 1",
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(CacheError::from)?;
        Ok(row.as_ref().map(task_run_from_row).transpose()?)
    }

    async fn running_run(&self, name: TaskName) -> anyhow::Result<Option<TaskRun>> {
        let row = sqlx::query(
            "SELECT * FROM task_runs WHERE name = ? AND result = ? \
             ORDER BY time_run DESC LIMIT 1",
        )
        .bind(name.as_str())
        .bind(TaskState::Running.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(CacheError::from)?;
        Ok(row.as_ref().map(task_run_from_row).transpose()?)
    }

    async fn fail_stale_running(&self, name: TaskName) -> anyhow::Result<u64> {
        let result = sqlx::query("UPDATE task_runs SET result = ? WHERE name = ? AND result = ?")
            .bind(TaskState::Failed.as_str())
            .bind(name.as_str())
            .bind(TaskState::Running.as_str())
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(result.rows_affected())
    }

    async fn recent_runs(&self, limit: u32) -> anyhow::Result<Vec<TaskRun>> {
        let rows = sqlx::query("SELECT * FROM task_runs ORDER BY time_run DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(rows
            .iter()
            .map(task_run_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
