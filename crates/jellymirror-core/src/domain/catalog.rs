//! Mirrored catalog rows
//!
//! Every struct here is one row of the local store. The storage layer owns
//! them; the sync engine only builds them from remote records and keeps
//! transient id sets during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote item types mirrored as library items
pub const CONTAINER_TYPES: &[&str] = &["Movie", "Audio", "Series"];

/// How a remote record returned by a library listing is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Movie, Audio or Series: becomes a [`LibraryItem`]
    Container,
    /// Becomes a [`Season`]
    Season,
    /// Becomes an [`Episode`]
    Episode,
    /// Anything else (folders, extras, photos) is not mirrored
    Other,
}

impl RecordKind {
    /// Classify a remote `Type` value
    pub fn classify(item_type: Option<&str>) -> Self {
        match item_type {
            Some("Season") => RecordKind::Season,
            Some("Episode") => RecordKind::Episode,
            Some(t) if CONTAINER_TYPES.contains(&t) => RecordKind::Container,
            _ => RecordKind::Other,
        }
    }
}

/// A top-level media folder on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub id: String,
    pub name: String,
    pub collection_type: Option<String>,
    pub archived: bool,
}

/// A movie, audio track or series inside a library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: String,
    pub name: String,
    /// Owning library id
    pub parent_id: String,
    pub item_type: String,
    pub production_year: Option<i32>,
    pub path: Option<String>,
    pub run_time_ticks: Option<i64>,
    pub date_created: Option<DateTime<Utc>>,
    pub archived: bool,
}

impl LibraryItem {
    pub fn is_series(&self) -> bool {
        self.item_type == "Series"
    }

    /// Whether the item carries its own media sources (series do not)
    pub fn carries_media(&self) -> bool {
        self.item_type != "Series" && self.item_type != "Folder"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: String,
    pub name: String,
    pub series_id: String,
    pub series_name: Option<String>,
    pub index_number: Option<i32>,
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: String,
    pub name: String,
    /// Nullable: the server occasionally returns episodes outside any season
    pub season_id: Option<String>,
    pub series_id: String,
    pub series_name: Option<String>,
    pub season_name: Option<String>,
    pub index_number: Option<i32>,
    pub parent_index_number: Option<i32>,
    pub archived: bool,
}

/// Owner of a media-source row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    Item,
    Episode,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Item => "Item",
            OwnerKind::Episode => "Episode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Item" => Some(OwnerKind::Item),
            "Episode" => Some(OwnerKind::Episode),
            _ => None,
        }
    }
}

/// One media source (file) of a movie, audio item or episode
///
/// Identity is the media source id. Rows are never archived; they are
/// deleted once their owner disappears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: String,
    pub owner_id: String,
    pub owner_kind: OwnerKind,
    pub path: Option<String>,
    pub name: Option<String>,
    pub size: Option<i64>,
    pub bitrate: Option<i64>,
    /// Stream metadata as returned by the server
    pub media_streams: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub is_administrator: bool,
    pub last_login_date: Option<DateTime<Utc>>,
    pub last_activity_date: Option<DateTime<Utc>>,
}

/// A single playback session recorded in the mirror
///
/// For episodes `now_playing_item_id` holds the series id and
/// `episode_id`/`season_id` point at the episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackActivity {
    pub id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub now_playing_item_id: String,
    pub now_playing_item_name: String,
    pub season_id: Option<String>,
    pub episode_id: Option<String>,
    pub series_name: Option<String>,
    pub client: Option<String>,
    pub device_name: Option<String>,
    pub play_method: Option<String>,
    pub play_duration_secs: i64,
    pub activity_date: DateTime<Utc>,
}

/// Staged row copied from the Playback Reporting plugin database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedPluginRow {
    pub rowid: i64,
    pub date_created: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub item_id: Option<String>,
    pub item_type: Option<String>,
    pub item_name: Option<String>,
    pub play_method: Option<String>,
    pub client_name: Option<String>,
    pub device_name: Option<String>,
    pub play_duration: i64,
}

/// Per-library counters maintained by the statistics refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub library_id: String,
    pub library_name: String,
    pub item_count: i64,
    pub season_count: i64,
    pub episode_count: i64,
    pub total_play_seconds: i64,
}
