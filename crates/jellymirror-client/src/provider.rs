//! JellyfinMediaSource - IMediaSource implementation over the Jellyfin API
//!
//! Wraps the [`JellyfinClient`] and maps the port operations onto REST
//! endpoints:
//!
//! | Operation                | Endpoint                                      |
//! |--------------------------|-----------------------------------------------|
//! | `list_libraries`         | `GET /Library/MediaFolders`                   |
//! | `list_items`             | `GET /Items?ParentId=…&Recursive=true`        |
//! | `list_users`             | `GET /Users`                                  |
//! | `list_installed_plugins` | `GET /Plugins`                                |
//! | `run_plugin_query`       | `POST /user_usage_stats/submit_custom_query`  |

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use jellymirror_core::ports::{
    IMediaSource, ItemQuery, PluginQueryResult, RemoteItem, RemoteLibrary, RemotePlugin,
    RemoteUser,
};

use crate::client::JellyfinClient;

/// Extra fields requested on every item listing
const ITEM_FIELDS: &str = "MediaSources,Path,DateCreated,ProductionYear,SeriesName,SeasonName,\
ParentId,SeriesId,SeasonId,IndexNumber,ParentIndexNumber,RunTimeTicks";

// ============================================================================
// Wire envelopes
// ============================================================================

/// `{"Items": [...], "TotalRecordCount": n}` envelope used by list endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsEnvelope<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CustomQueryRequest<'a> {
    custom_query_string: &'a str,
    replace_user_id: bool,
}

/// Builds the query string for one page of a recursive listing
fn item_query_params(query: &ItemQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("ParentId", query.parent_id.clone()),
        ("Recursive", "true".to_string()),
        ("StartIndex", query.start_index.to_string()),
        ("Limit", query.limit.to_string()),
        ("Fields", ITEM_FIELDS.to_string()),
        ("EnableImages", "false".to_string()),
    ];
    if let Some(since) = query.min_date_last_saved {
        params.push((
            "MinDateLastSaved",
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
    }
    params
}

// ============================================================================
// JellyfinMediaSource
// ============================================================================

/// Media source backed by a live Jellyfin server
pub struct JellyfinMediaSource {
    client: JellyfinClient,
}

impl JellyfinMediaSource {
    pub fn new(client: JellyfinClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &JellyfinClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl IMediaSource for JellyfinMediaSource {
    async fn list_libraries(&self) -> anyhow::Result<Vec<RemoteLibrary>> {
        let envelope: ItemsEnvelope<RemoteLibrary> =
            self.client.get_json("/Library/MediaFolders", &[]).await?;
        debug!(count = envelope.items.len(), "Fetched media folders");
        Ok(envelope.items)
    }

    async fn list_items(&self, query: &ItemQuery) -> anyhow::Result<Vec<RemoteItem>> {
        let params = item_query_params(query);
        let envelope: ItemsEnvelope<RemoteItem> = self.client.get_json("/Items", &params).await?;
        debug!(
            parent_id = %query.parent_id,
            start_index = query.start_index,
            count = envelope.items.len(),
            "Fetched item page"
        );
        Ok(envelope.items)
    }

    async fn list_users(&self) -> anyhow::Result<Vec<RemoteUser>> {
        Ok(self.client.get_json("/Users", &[]).await?)
    }

    async fn list_installed_plugins(&self) -> anyhow::Result<Vec<RemotePlugin>> {
        Ok(self.client.get_json("/Plugins", &[]).await?)
    }

    async fn run_plugin_query(&self, sql: &str) -> anyhow::Result<PluginQueryResult> {
        let body = CustomQueryRequest {
            custom_query_string: sql,
            replace_user_id: false,
        };
        let result: PluginQueryResult = self
            .client
            .post_json("/user_usage_stats/submit_custom_query", &body)
            .await?;
        debug!(rows = result.results.len(), "Plugin query returned");
        Ok(result)
    }
}
