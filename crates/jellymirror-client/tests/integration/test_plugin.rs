//! Integration tests for plugin detection and the custom query endpoint

use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use jellymirror_core::ports::IMediaSource;

use crate::common;

#[tokio::test]
async fn test_list_installed_plugins() {
    let (server, source) = common::setup_mock().await;
    common::mount_plugins(
        &server,
        serde_json::json!([
            {"Name": "Playback Reporting", "Version": "16.0.0.0",
             "ConfigurationFileName": "Jellyfin.Plugin.PlaybackReporting.xml"},
            {"Name": "TMDb", "Version": "10.9.0.0"}
        ]),
    )
    .await;

    let plugins = source.list_installed_plugins().await.unwrap();

    assert_eq!(plugins.len(), 2);
    assert_eq!(
        plugins[0].configuration_file_name.as_deref(),
        Some("Jellyfin.Plugin.PlaybackReporting.xml")
    );
    assert!(plugins[1].configuration_file_name.is_none());
}

#[tokio::test]
async fn test_run_plugin_query_posts_sql() {
    let (server, source) = common::setup_mock().await;
    let sql = "SELECT rowid, * FROM PlaybackActivity WHERE rowid > 10 order by rowid";

    Mock::given(method("POST"))
        .and(path("/user_usage_stats/submit_custom_query"))
        .and(body_json(serde_json::json!({
            "CustomQueryString": sql,
            "ReplaceUserId": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "colums": ["rowid", "DateCreated", "UserId", "ItemId", "PlayDuration"],
            "results": [
                [11, "2026-10-01 20:15:00.1234567", "u1", "m1", "3600"],
                [12, "2026-10-02 21:00:00", "u1", "e1", "1200"]
            ],
            "message": ""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = source.run_plugin_query(sql).await.unwrap();

    assert_eq!(result.columns[0], "rowid");
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.results[1][3], serde_json::json!("e1"));
}

#[tokio::test]
async fn test_missing_plugin_endpoint_is_not_found() {
    let (server, source) = common::setup_mock().await;
    Mock::given(method("POST"))
        .and(path("/user_usage_stats/submit_custom_query"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = source.run_plugin_query("SELECT 1").await.unwrap_err();
    assert!(err.to_string().starts_with("Not found"));
}
