//! Playback Reporting plugin import tests

mod common;

use serde_json::json;

use jellymirror_core::domain::{
    ProgressKind, RunId, TaskName, TaskRun, TaskState, TriggerType,
};
use jellymirror_core::ports::{ICatalogStore, ITaskLog, PluginQueryResult};
use jellymirror_sync::SyncError;

use common::{messages, Harness};

fn plugin_rows() -> PluginQueryResult {
    let columns = [
        "rowid",
        "DateCreated",
        "UserId",
        "ItemId",
        "ItemType",
        "ItemName",
        "PlaybackMethod",
        "ClientName",
        "DeviceName",
        "PlayDuration",
    ];
    PluginQueryResult {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        results: vec![
            vec![
                json!(1),
                json!("2026-10-01 20:15:00"),
                json!("u1"),
                json!("m1"),
                json!("Movie"),
                json!("Alpha"),
                json!("DirectPlay"),
                json!("Web"),
                json!("Firefox"),
                json!("3600"),
            ],
            vec![
                json!(2),
                json!("2026-10-02 21:00:00"),
                json!("u1"),
                json!("e1"),
                json!("Episode"),
                json!("Show - Pilot"),
                json!("Transcode"),
                json!("Android TV"),
                json!("Shield"),
                json!("1200"),
            ],
        ],
    }
}

#[tokio::test]
async fn test_missing_plugin_only_folds() {
    let h = Harness::new().await;
    h.source.set_plugins(&["tmdb.xml"]);

    let report = h
        .engine
        .import_plugin_data(TriggerType::Manual)
        .await
        .unwrap();

    assert_eq!(report.run.result(), TaskState::Success);
    assert!(h.source.plugin_queries().is_empty());
    let lines = messages(report.run.logged_data());
    assert!(lines.contains(&"Playback Reporting Plugin not detected. No new data to insert."));
    assert!(lines.contains(&"Any imported data has been processed."));
}

#[tokio::test]
async fn test_plugin_rows_are_imported_and_folded() {
    let h = Harness::new().await;
    h.seed_catalog();
    h.engine.full_sync(TriggerType::Manual).await.unwrap();
    h.source.set_plugins(&["Jellyfin.Plugin.PlaybackReporting.xml"]);
    h.source.set_plugin_result(plugin_rows());

    let report = h
        .engine
        .import_plugin_data(TriggerType::Manual)
        .await
        .unwrap();

    assert_eq!(
        h.source.plugin_queries(),
        vec!["SELECT rowid, * FROM PlaybackActivity order by rowid".to_string()]
    );
    assert!(messages(report.run.logged_data()).contains(&"Inserting 2 Rows."));

    let activity = h.store.playback_activity().await.unwrap();
    assert_eq!(activity.len(), 2);
    assert_eq!(activity[0].id, "plugin:1");
    assert_eq!(activity[0].user_name.as_deref(), Some("alice"));
    // Episode plays are attributed to their series
    assert_eq!(activity[1].now_playing_item_id, "s1");
    assert_eq!(activity[1].episode_id.as_deref(), Some("e1"));
    assert_eq!(activity[1].play_duration_secs, 1200);

    let events = h.progress.on_channel("PlaybackSyncTask");
    assert_eq!(events.first().unwrap().message, "Playback Plugin Sync Started");
    assert_eq!(events.last().unwrap().kind, ProgressKind::Success);
    assert_eq!(events.last().unwrap().message, "Playback Plugin Sync Completed");

    // A second import only asks for rows outside the mirrored range
    h.source.set_plugin_result(PluginQueryResult::default());
    h.engine
        .import_plugin_data(TriggerType::Manual)
        .await
        .unwrap();
    let queries = h.source.plugin_queries();
    assert_eq!(
        queries[1],
        "SELECT rowid, * FROM PlaybackActivity WHERE \
         (DateCreated < '2026-10-01 20:15:00' or DateCreated > '2026-10-02 21:00:00') \
         order by rowid"
    );
    assert_eq!(h.store.playback_activity().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_plugin_import_ignores_running_sync_rows() {
    let h = Harness::new().await;
    h.source.set_plugins(&[]);
    h.store
        .insert_run(&TaskRun::start(
            RunId::new(),
            TaskName::FullSync,
            TriggerType::Scheduled,
        ))
        .await
        .unwrap();

    h.engine
        .import_plugin_data(TriggerType::Manual)
        .await
        .unwrap();

    let err = h.engine.partial_sync(TriggerType::Manual).await.unwrap_err();
    assert!(matches!(err, SyncError::ConcurrentRunConflict { .. }));
    assert!(h
        .store
        .latest_run(TaskName::PartialSync)
        .await
        .unwrap()
        .is_none());
}
