//! Integration tests for library, item and user listings

use chrono::{TimeZone, Utc};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use jellymirror_core::ports::{IMediaSource, ItemQuery};

use crate::common;

#[tokio::test]
async fn test_list_libraries_reads_items_envelope() {
    let (server, source) = common::setup_mock().await;
    common::mount_media_folders(
        &server,
        serde_json::json!([
            {"Id": "lib-movies", "Name": "Movies", "CollectionType": "movies"},
            {"Id": "lib-shows", "Name": "Shows", "CollectionType": "tvshows"}
        ]),
    )
    .await;

    let libraries = source.list_libraries().await.expect("list_libraries failed");

    assert_eq!(libraries.len(), 2);
    assert_eq!(libraries[0].id.as_deref(), Some("lib-movies"));
    assert_eq!(libraries[1].collection_type.as_deref(), Some("tvshows"));
}

#[tokio::test]
async fn test_list_items_sends_paging_parameters() {
    let (server, source) = common::setup_mock().await;

    Mock::given(method("GET"))
        .and(path("/Items"))
        .and(query_param("ParentId", "lib-shows"))
        .and(query_param("Recursive", "true"))
        .and(query_param("StartIndex", "200"))
        .and(query_param("Limit", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Items": [
                {"Id": "s1", "Name": "Show", "Type": "Series", "ParentId": "lib-shows"},
                {"Id": "se1", "Name": "Season 1", "Type": "Season", "SeriesId": "s1",
                 "SeriesName": "Show", "IndexNumber": 1},
                {"Id": "e1", "Name": "Pilot", "Type": "Episode", "SeriesId": "s1",
                 "SeasonId": "se1", "SeriesName": "Show",
                 "MediaSources": [{"Id": "ms-e1", "Path": "/tv/show/e1.mkv", "Size": 1000}]}
            ],
            "TotalRecordCount": 403
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = ItemQuery::first_page("lib-shows", 200).next_page();
    let items = source.list_items(&query).await.expect("list_items failed");

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].item_type.as_deref(), Some("Series"));
    assert_eq!(items[1].series_id.as_deref(), Some("s1"));
    assert_eq!(items[2].media_sources[0].path.as_deref(), Some("/tv/show/e1.mkv"));
}

#[tokio::test]
async fn test_list_items_with_recency_window() {
    let (server, source) = common::setup_mock().await;

    Mock::given(method("GET"))
        .and(path("/Items"))
        .and(query_param("MinDateLastSaved", "2026-10-17T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Items": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let since = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
    let query = ItemQuery::first_page("lib-movies", 200).changed_since(since);
    let items = source.list_items(&query).await.unwrap();

    assert!(items.is_empty());
}

#[tokio::test]
async fn test_list_users() {
    let (server, source) = common::setup_mock().await;
    common::mount_users(
        &server,
        serde_json::json!([
            {"Id": "u1", "Name": "alice", "Policy": {"IsAdministrator": true},
             "LastLoginDate": "2026-10-01T10:00:00.0000000Z"},
            {"Id": "u2", "Name": "bob"}
        ]),
    )
    .await;

    let users = source.list_users().await.unwrap();

    assert_eq!(users.len(), 2);
    assert!(users[0].policy.as_ref().unwrap().is_administrator);
    assert!(users[1].policy.is_none());
}

#[tokio::test]
async fn test_unauthorized_is_reported() {
    let (server, source) = common::setup_mock().await;
    Mock::given(method("GET"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = source.list_users().await.unwrap_err();
    let client_err = err
        .downcast_ref::<jellymirror_client::ClientError>()
        .expect("ClientError expected");
    assert!(matches!(
        client_err,
        jellymirror_client::ClientError::Unauthorized(_)
    ));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let (server, source) = common::setup_mock().await;
    Mock::given(method("GET"))
        .and(path("/Library/MediaFolders"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .mount(&server)
        .await;

    let err = source.list_libraries().await.unwrap_err();
    assert!(err.to_string().contains("Invalid response"));
}
