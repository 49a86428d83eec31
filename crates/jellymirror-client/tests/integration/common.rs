//! Shared test helpers for Jellyfin API integration tests
//!
//! Each helper mounts mock endpoints on a wiremock server. `setup_mock`
//! returns a media source pointed at the server with the test API key.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jellymirror_client::{JellyfinClient, JellyfinMediaSource};

pub const API_KEY: &str = "test-api-key";

/// Starts a server and returns it with a source that does not retry
pub async fn setup_mock() -> (MockServer, JellyfinMediaSource) {
    let server = MockServer::start().await;
    let client = JellyfinClient::with_base_url(API_KEY, server.uri()).with_max_retries(0);
    (server, JellyfinMediaSource::new(client))
}

/// Mounts `GET /Library/MediaFolders` returning `folders` as the Items list
pub async fn mount_media_folders(server: &MockServer, folders: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/Library/MediaFolders"))
        .and(header("X-MediaBrowser-Token", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Items": folders,
            "TotalRecordCount": 0
        })))
        .mount(server)
        .await;
}

/// Mounts `GET /Users`
pub async fn mount_users(server: &MockServer, users: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/Users"))
        .and(header("X-MediaBrowser-Token", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(users))
        .mount(server)
        .await;
}

/// Mounts `GET /Plugins`
#[allow(dead_code)]
pub async fn mount_plugins(server: &MockServer, plugins: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/Plugins"))
        .respond_with(ResponseTemplate::new(200).set_body_json(plugins))
        .mount(server)
        .await;
}
