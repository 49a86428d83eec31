//! Media source port (driven/secondary port)
//!
//! This module defines the interface to the remote media server and the
//! record shapes it returns.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transport errors are adapter-specific.
//! - Remote records deserialize with the server's PascalCase field names.
//!   Every field is optional; the record mapper decides what is required.
//! - `list_items` returns one page. Callers paginate until an empty page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Remote records
// ============================================================================

/// A media folder as listed by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteLibrary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub collection_type: Option<String>,
}

/// One media source attached to an item or episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteMediaSource {
    pub id: Option<String>,
    pub path: Option<String>,
    pub name: Option<String>,
    pub size: Option<i64>,
    pub bitrate: Option<i64>,
    #[serde(default)]
    pub media_streams: Vec<Value>,
}

/// Any record returned by a recursive item listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteItem {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "Type")]
    pub item_type: Option<String>,
    pub parent_id: Option<String>,
    pub series_id: Option<String>,
    pub season_id: Option<String>,
    pub series_name: Option<String>,
    pub season_name: Option<String>,
    pub index_number: Option<i32>,
    pub parent_index_number: Option<i32>,
    pub production_year: Option<i32>,
    pub path: Option<String>,
    pub run_time_ticks: Option<i64>,
    pub date_created: Option<String>,
    #[serde(default)]
    pub media_sources: Vec<RemoteMediaSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteUserPolicy {
    #[serde(default)]
    pub is_administrator: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteUser {
    pub id: Option<String>,
    pub name: Option<String>,
    pub policy: Option<RemoteUserPolicy>,
    pub last_login_date: Option<String>,
    pub last_activity_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemotePlugin {
    pub name: Option<String>,
    pub version: Option<String>,
    pub configuration_file_name: Option<String>,
}

/// Result table of a Playback Reporting custom query
///
/// The plugin spells the header key `colums`; both spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginQueryResult {
    #[serde(alias = "colums", default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub results: Vec<Vec<Value>>,
}

// ============================================================================
// Queries
// ============================================================================

/// One page request for the recursive listing under a library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub parent_id: String,
    pub start_index: u32,
    pub limit: u32,
    /// Only records saved at or after this instant (partial sync)
    pub min_date_last_saved: Option<DateTime<Utc>>,
}

impl ItemQuery {
    /// First page under `parent_id`
    pub fn first_page(parent_id: impl Into<String>, limit: u32) -> Self {
        Self {
            parent_id: parent_id.into(),
            start_index: 0,
            limit,
            min_date_last_saved: None,
        }
    }

    pub fn changed_since(mut self, since: DateTime<Utc>) -> Self {
        self.min_date_last_saved = Some(since);
        self
    }

    /// The page after this one
    pub fn next_page(&self) -> Self {
        Self {
            start_index: self.start_index + self.limit,
            ..self.clone()
        }
    }

    pub fn is_first_page(&self) -> bool {
        self.start_index == 0
    }
}

// ============================================================================
// IMediaSource trait
// ============================================================================

/// Port trait for the remote media server
#[async_trait::async_trait]
pub trait IMediaSource: Send + Sync {
    /// Lists the top-level media folders
    async fn list_libraries(&self) -> anyhow::Result<Vec<RemoteLibrary>>;

    /// Fetches one page of records under a library
    async fn list_items(&self, query: &ItemQuery) -> anyhow::Result<Vec<RemoteItem>>;

    async fn list_users(&self) -> anyhow::Result<Vec<RemoteUser>>;

    async fn list_installed_plugins(&self) -> anyhow::Result<Vec<RemotePlugin>>;

    /// Runs a read-only SQL query against the Playback Reporting plugin
    async fn run_plugin_query(&self, sql: &str) -> anyhow::Result<PluginQueryResult>;
}
