//! Jellymirror Client - Jellyfin HTTP API client
//!
//! Provides an async client for the parts of the Jellyfin API the mirror
//! reads from:
//! - Media folders, recursive item listings and users
//! - Installed plugins and the Playback Reporting custom query endpoint
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client with retry on throttling
//! - [`provider`] - [`IMediaSource`](jellymirror_core::ports::IMediaSource) adapter
//! - [`retry`] - Retry-After parsing and backoff

pub mod client;
pub mod provider;
pub mod retry;

pub use client::JellyfinClient;
pub use provider::JellyfinMediaSource;

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when communicating with a Jellyfin server
#[derive(Debug, Error)]
pub enum ClientError {
    /// The API key was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The key is valid but lacks the required permission
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested endpoint or resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Throttled; retries were exhausted
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The server URL could not be used as a base URL
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// The response body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Whether a later attempt of the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::TooManyRequests { .. } | ClientError::ServerError(_)
        )
    }
}
