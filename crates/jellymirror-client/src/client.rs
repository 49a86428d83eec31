//! Jellyfin HTTP client
//!
//! Provides a typed HTTP client for the Jellyfin REST API. Handles the
//! API-key header, base URL construction, JSON decoding and retries on
//! throttling or server errors.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use jellymirror_client::client::JellyfinClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = JellyfinClient::new("http://jellyfin:8096", "api-key", Duration::from_secs(30))?;
//! let users: serde_json::Value = client.get_json("/Users", &[]).await?;
//! println!("{users}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::retry::{backoff_delay, parse_retry_after, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_AFTER};
use crate::ClientError;

/// Header carrying the API key on every request
pub const TOKEN_HEADER: &str = "X-MediaBrowser-Token";

// ============================================================================
// JellyfinClient
// ============================================================================

/// HTTP client for Jellyfin API calls
///
/// Wraps `reqwest::Client` with the authentication header and base URL of
/// one server.
#[derive(Clone)]
pub struct JellyfinClient {
    client: Client,
    /// Server root without a trailing slash
    base_url: String,
    api_key: String,
    /// Retries after the first attempt for 429 and 5xx responses
    max_retries: u32,
}

impl JellyfinClient {
    /// Creates a client for `base_url` with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if `base_url` is not an absolute
    /// http(s) URL, or `ClientError::NetworkError` if the underlying client
    /// cannot be built.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let parsed =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "{base_url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Creates a client with default transport settings (useful for testing)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Creates an authenticated request builder for `path` under the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .header(TOKEN_HEADER, &self.api_key)
    }

    /// GET `path` with query parameters and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let response = self
            .execute_with_retry(path, || self.request(Method::GET, path).query(query))
            .await?;
        decode(path, response).await
    }

    /// POST a JSON body to `path` and decode the JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .execute_with_retry(path, || self.request(Method::POST, path).json(body))
            .await?;
        decode(path, response).await
    }

    /// Sends the request built by `build`, retrying on 429 and 5xx.
    ///
    /// A `Retry-After` header is honoured on both; without one, 429 waits
    /// a fixed delay and 5xx backs off exponentially. Other non-success
    /// statuses fail immediately.
    pub async fn execute_with_retry<F>(&self, path: &str, build: F) -> Result<Response, ClientError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let response = build().send().await?;
            let status = response.status();

            if status.is_success() {
                if attempt > 0 {
                    info!(path, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !retryable {
                return Err(status_error(path, response).await);
            }

            let header_wait = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER));

            if attempt >= self.max_retries {
                warn!(path, attempts = attempt + 1, %status, "Retry limit exhausted");
                return Err(status_error(path, response).await);
            }

            let wait = match header_wait {
                Some(wait) => wait,
                None if status == StatusCode::TOO_MANY_REQUESTS => DEFAULT_RETRY_AFTER,
                None => backoff_delay(attempt),
            };

            info!(
                path,
                attempt,
                %status,
                retry_after_ms = wait.as_millis() as u64,
                "Request throttled or failed, backing off"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

// ============================================================================
// Response handling
// ============================================================================

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ClientError> {
    let body = response.text().await?;
    debug!(path, bytes = body.len(), "Response received");
    serde_json::from_str(&body)
        .map_err(|e| ClientError::InvalidResponse(format!("{path}: {e}")))
}

async fn status_error(path: &str, response: Response) -> ClientError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
        .unwrap_or(DEFAULT_RETRY_AFTER);
    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        format!("{path} returned {status}")
    } else {
        format!("{path} returned {status}: {body}")
    };

    match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(detail),
        StatusCode::FORBIDDEN => ClientError::Forbidden(detail),
        StatusCode::NOT_FOUND => ClientError::NotFound(detail),
        StatusCode::TOO_MANY_REQUESTS => ClientError::TooManyRequests { retry_after },
        s if s.is_server_error() => ClientError::ServerError(detail),
        _ => ClientError::InvalidResponse(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_sets_token_header() {
        let client = JellyfinClient::with_base_url("secret", "http://localhost:8096");
        let request = client.request(Method::GET, "/Users").build().unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8096/Users");
        assert_eq!(
            request.headers().get(TOKEN_HEADER).unwrap().to_str().unwrap(),
            "secret"
        );
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client =
            JellyfinClient::new("http://media.lan:8096/", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://media.lan:8096");
        let request = client.request(Method::GET, "/Plugins").build().unwrap();
        assert_eq!(request.url().as_str(), "http://media.lan:8096/Plugins");
    }

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(matches!(
            JellyfinClient::new("ftp://media.lan", "key", Duration::from_secs(5)),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            JellyfinClient::new("not a url", "key", Duration::from_secs(5)),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_max_retries_override() {
        let client = JellyfinClient::with_base_url("key", "http://localhost").with_max_retries(0);
        assert_eq!(client.max_retries(), 0);
    }
}
