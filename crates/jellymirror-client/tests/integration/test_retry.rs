//! Integration tests for 429 / 5xx retry handling

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jellymirror_client::{ClientError, JellyfinClient, JellyfinMediaSource};
use jellymirror_core::ports::IMediaSource;

fn retrying_source(server: &MockServer, retries: u32) -> JellyfinMediaSource {
    JellyfinMediaSource::new(
        JellyfinClient::with_base_url("test-api-key", server.uri()).with_max_retries(retries),
    )
}

#[tokio::test]
async fn test_429_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Users"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{"Id": "u1", "Name": "a"}])),
        )
        .mount(&server)
        .await;

    let users = retrying_source(&server, 2).list_users().await.unwrap();
    assert_eq!(users.len(), 1);
}

#[tokio::test]
async fn test_server_error_retries_are_bounded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Plugins"))
        .respond_with(ResponseTemplate::new(503).append_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let err = retrying_source(&server, 2)
        .list_installed_plugins()
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ClientError>(),
        Some(ClientError::ServerError(_))
    ));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Library/MediaFolders"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let err = retrying_source(&server, 3)
        .list_libraries()
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ClientError>(),
        Some(ClientError::Forbidden(_))
    ));
}
