//! Integration test: TaskLogger → SQLite → query back
//!
//! Uses a real in-memory SQLite database to verify the full flow:
//! TaskLogger opens and closes runs → ITaskLog persists them →
//! latest/recent queries return them.

use std::sync::Arc;

use jellymirror_audit::TaskLogger;
use jellymirror_cache::{DatabasePool, SqliteCatalogStore};
use jellymirror_core::{
    domain::{LogLevel, LogLine, TaskName, TaskState, TriggerType},
    ports::ITaskLog,
};

async fn make_logger() -> (Arc<SqliteCatalogStore>, TaskLogger) {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let store = Arc::new(SqliteCatalogStore::new(pool.pool().clone()));
    let logger = TaskLogger::new(Arc::clone(&store) as Arc<dyn ITaskLog>);
    (store, logger)
}

#[tokio::test]
async fn test_task_logger_integration_with_sqlite() {
    let (store, logger) = make_logger().await;

    let mut run = logger
        .open_run(TaskName::FullSync, TriggerType::Manual)
        .await
        .unwrap();

    // While running, a partial sync is blocked
    let conflict = logger.conflicting_run(TaskName::PartialSync).await.unwrap();
    assert_eq!(conflict.map(|r| r.id()), Some(run.id()));

    logger
        .close_run(
            &mut run,
            TaskState::Failed,
            vec![
                LogLine::info("Syncing... 1/3"),
                LogLine::error("fetch_items: Error: connection reset"),
            ],
        )
        .await;

    let stored = store.get_run(run.id()).await.unwrap().expect("run persisted");
    assert_eq!(stored.result(), TaskState::Failed);
    assert_eq!(stored.logged_data()[1].level, LogLevel::Error);
    assert!(logger
        .conflicting_run(TaskName::PartialSync)
        .await
        .unwrap()
        .is_none());

    let latest = logger.latest_run(TaskName::FullSync).await.unwrap().unwrap();
    assert_eq!(latest.id(), run.id());
    assert_eq!(logger.recent_runs(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stale_runs_are_failed_at_startup() {
    let (store, logger) = make_logger().await;

    let crashed = logger
        .open_run(TaskName::PartialSync, TriggerType::Scheduled)
        .await
        .unwrap();

    assert_eq!(logger.fail_stale_runs(TaskName::PartialSync).await, 1);

    let stored = store.get_run(crashed.id()).await.unwrap().unwrap();
    assert_eq!(stored.result(), TaskState::Failed);
}
