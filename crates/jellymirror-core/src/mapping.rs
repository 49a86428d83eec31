//! Record mapper
//!
//! Pure functions translating one remote record into one local row. A
//! mapper returns `None` when the record lacks the fields that make up its
//! identity; such records are dropped before they reach the store.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::{
    domain::{Episode, ImportedPluginRow, ItemInfo, Library, LibraryItem, OwnerKind, Season, User},
    ports::{RemoteItem, RemoteLibrary, RemoteMediaSource, RemoteUser},
};

/// Parses the date formats the server and its plugins emit
///
/// Accepts RFC 3339 (with up to seven fractional digits) and naive
/// `YYYY-MM-DD HH:MM:SS[.f]` timestamps, which are taken as UTC.
pub fn parse_remote_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|s| !s.is_empty()).map(str::to_owned)
}

pub fn map_library(record: &RemoteLibrary) -> Option<Library> {
    Some(Library {
        id: non_empty(&record.id)?,
        name: record.name.clone().unwrap_or_default(),
        collection_type: record.collection_type.clone(),
        archived: false,
    })
}

/// Maps a movie, audio or series record; the owning library is the one
/// being listed, not the record's own `ParentId`.
pub fn map_item(record: &RemoteItem, library_id: &str) -> Option<LibraryItem> {
    Some(LibraryItem {
        id: non_empty(&record.id)?,
        name: record.name.clone().unwrap_or_default(),
        parent_id: library_id.to_string(),
        item_type: record.item_type.clone().unwrap_or_default(),
        production_year: record.production_year,
        path: record.path.clone(),
        run_time_ticks: record.run_time_ticks,
        date_created: record.date_created.as_deref().and_then(parse_remote_date),
        archived: false,
    })
}

/// Seasons without a series cannot be attached and are rejected
pub fn map_season(record: &RemoteItem) -> Option<Season> {
    Some(Season {
        id: non_empty(&record.id)?,
        name: record.name.clone().unwrap_or_default(),
        series_id: non_empty(&record.series_id)?,
        series_name: record.series_name.clone(),
        index_number: record.index_number,
        archived: false,
    })
}

/// Episodes keep a missing season as `None`; the reconciler removes them later
pub fn map_episode(record: &RemoteItem) -> Option<Episode> {
    Some(Episode {
        episode_id: non_empty(&record.id)?,
        name: record.name.clone().unwrap_or_default(),
        season_id: non_empty(&record.season_id),
        series_id: non_empty(&record.series_id)?,
        series_name: record.series_name.clone(),
        season_name: record.season_name.clone(),
        index_number: record.index_number,
        parent_index_number: record.parent_index_number,
        archived: false,
    })
}

pub fn map_item_info(
    source: &RemoteMediaSource,
    owner_id: &str,
    owner_kind: OwnerKind,
) -> Option<ItemInfo> {
    Some(ItemInfo {
        id: non_empty(&source.id)?,
        owner_id: owner_id.to_string(),
        owner_kind,
        path: source.path.clone(),
        name: source.name.clone(),
        size: source.size,
        bitrate: source.bitrate,
        media_streams: Value::Array(source.media_streams.clone()),
    })
}

/// All media-source rows of one item or episode record
pub fn map_media_sources(record: &RemoteItem, owner_kind: OwnerKind) -> Vec<ItemInfo> {
    let Some(owner_id) = non_empty(&record.id) else {
        return Vec::new();
    };
    record
        .media_sources
        .iter()
        .filter_map(|source| map_item_info(source, &owner_id, owner_kind))
        .collect()
}

pub fn map_user(record: &RemoteUser) -> Option<User> {
    Some(User {
        id: non_empty(&record.id)?,
        name: record.name.clone().unwrap_or_default(),
        is_administrator: record
            .policy
            .as_ref()
            .map(|p| p.is_administrator)
            .unwrap_or(false),
        last_login_date: record.last_login_date.as_deref().and_then(parse_remote_date),
        last_activity_date: record
            .last_activity_date
            .as_deref()
            .and_then(parse_remote_date),
    })
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Maps one row of a Playback Reporting query result by column name
pub fn map_plugin_row(columns: &[String], row: &[Value]) -> Option<ImportedPluginRow> {
    let cell = |name: &str| {
        columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| row.get(i))
    };
    let text = |name: &str| cell(name).and_then(value_as_string);

    Some(ImportedPluginRow {
        rowid: cell("rowid").and_then(value_as_i64)?,
        date_created: text("DateCreated").as_deref().and_then(parse_remote_date),
        user_id: text("UserId"),
        item_id: text("ItemId"),
        item_type: text("ItemType"),
        item_name: text("ItemName"),
        play_method: text("PlaybackMethod"),
        client_name: text("ClientName"),
        device_name: text("DeviceName"),
        play_duration: cell("PlayDuration").and_then(value_as_i64).unwrap_or(0),
    })
}
