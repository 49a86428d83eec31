//! Catalog store port (driven/secondary port)
//!
//! This module defines the storage interface used by the reconciliation
//! engine: a bulk persistence gateway, id lookups and a small set of
//! storage-side housekeeping procedures.
//!
//! ## Design Notes
//!
//! - Bulk writes return [`BulkOutcome`] instead of an error. Each call is
//!   one transaction; callers treat `Failure` as fatal to the phase.
//! - Tables and columns are closed enums so that no caller-provided text
//!   ever reaches SQL. Ids are always bound parameters.
//! - Lookups and housekeeping return `anyhow::Result`.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::{
    Episode, ImportedPluginRow, ItemInfo, Library, LibraryItem, PlaybackActivity,
    Season, User,
};

// ============================================================================
// Tables, columns, values
// ============================================================================

/// Tables reachable through the bulk gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Libraries,
    Items,
    Seasons,
    Episodes,
    ItemInfo,
    Users,
    PlaybackActivity,
    PluginRows,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Libraries => "libraries",
            Table::Items => "library_items",
            Table::Seasons => "library_seasons",
            Table::Episodes => "library_episodes",
            Table::ItemInfo => "item_info",
            Table::Users => "users",
            Table::PlaybackActivity => "playback_activity",
            Table::PluginRows => "plugin_playback_rows",
        }
    }

    /// Identity column of the table
    pub fn id_column(&self) -> Column {
        match self {
            Table::Episodes => Column::EpisodeId,
            Table::PluginRows => Column::RowId,
            _ => Column::Id,
        }
    }

    /// Whether rows carry an `archived` flag instead of being deleted
    pub fn is_archivable(&self) -> bool {
        matches!(
            self,
            Table::Libraries | Table::Items | Table::Seasons | Table::Episodes
        )
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Columns usable as update target or key in [`ICatalogStore::set_field`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    EpisodeId,
    RowId,
    ParentId,
    SeriesId,
    SeasonId,
    Archived,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::EpisodeId => "episode_id",
            Column::RowId => "plugin_rowid",
            Column::ParentId => "parent_id",
            Column::SeriesId => "series_id",
            Column::SeasonId => "season_id",
            Column::Archived => "archived",
        }
    }
}

/// Value written by [`ICatalogStore::set_field`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
}

/// Rows for one bulk upsert, all of the same table
#[derive(Debug, Clone)]
pub enum RowBatch {
    Libraries(Vec<Library>),
    Items(Vec<LibraryItem>),
    Seasons(Vec<Season>),
    Episodes(Vec<Episode>),
    ItemInfo(Vec<ItemInfo>),
    Users(Vec<User>),
    PlaybackActivity(Vec<PlaybackActivity>),
    PluginRows(Vec<ImportedPluginRow>),
}

impl RowBatch {
    pub fn table(&self) -> Table {
        match self {
            RowBatch::Libraries(_) => Table::Libraries,
            RowBatch::Items(_) => Table::Items,
            RowBatch::Seasons(_) => Table::Seasons,
            RowBatch::Episodes(_) => Table::Episodes,
            RowBatch::ItemInfo(_) => Table::ItemInfo,
            RowBatch::Users(_) => Table::Users,
            RowBatch::PlaybackActivity(_) => Table::PlaybackActivity,
            RowBatch::PluginRows(_) => Table::PluginRows,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowBatch::Libraries(rows) => rows.len(),
            RowBatch::Items(rows) => rows.len(),
            RowBatch::Seasons(rows) => rows.len(),
            RowBatch::Episodes(rows) => rows.len(),
            RowBatch::ItemInfo(rows) => rows.len(),
            RowBatch::Users(rows) => rows.len(),
            RowBatch::PlaybackActivity(rows) => rows.len(),
            RowBatch::PluginRows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a bulk gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    Success,
    Failure(String),
}

impl BulkOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BulkOutcome::Success)
    }

    /// Converts a failure into `Err(message)`
    pub fn into_result(self) -> Result<(), String> {
        match self {
            BulkOutcome::Success => Ok(()),
            BulkOutcome::Failure(message) => Err(message),
        }
    }
}

// ============================================================================
// Housekeeping results
// ============================================================================

/// Rows removed by the storage-side orphan cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanReport {
    pub seasons: u64,
    pub episodes: u64,
    pub item_info: u64,
}

/// Activity that points at an inactive item id while an active item of the
/// same name exists
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemMigration {
    pub old_item_id: String,
    pub new_item_id: String,
}

/// Activity that points at an inactive episode while an active episode of
/// the same name and series name exists
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EpisodeMigration {
    pub old_episode_id: String,
    pub episode_id: String,
    pub season_id: Option<String>,
    pub series_id: String,
}

/// Oldest and newest activity dates in the mirror
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityBounds {
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

// ============================================================================
// ICatalogStore trait
// ============================================================================

/// Port trait for the local catalog mirror
#[async_trait::async_trait]
pub trait ICatalogStore: Send + Sync {
    // --- Bulk gateway ---

    /// Inserts or fully rewrites every row of the batch
    async fn upsert_many(&self, batch: RowBatch) -> BulkOutcome;

    /// Deletes rows by identity
    async fn delete_many(&self, table: Table, ids: &[String]) -> BulkOutcome;

    /// Sets `column = value` on every row whose `key` is in `ids`
    async fn set_field(
        &self,
        table: Table,
        ids: &[String],
        column: Column,
        value: FieldValue,
        key: Column,
    ) -> BulkOutcome;

    // --- Id lookups ---

    /// All identities in a table
    async fn all_ids(&self, table: Table) -> anyhow::Result<Vec<String>>;

    /// Identities of non-archived rows (libraries, items, seasons, episodes)
    async fn active_ids(&self, table: Table) -> anyhow::Result<Vec<String>>;

    /// Non-archived item ids whose library is in `library_ids`
    async fn active_item_ids_in_libraries(
        &self,
        library_ids: &[String],
    ) -> anyhow::Result<Vec<String>>;

    /// All item ids whose library is in `library_ids`
    async fn item_ids_in_libraries(&self, library_ids: &[String])
        -> anyhow::Result<Vec<String>>;

    /// Identities of seasons or episodes belonging to any of `series_ids`
    async fn ids_by_series(
        &self,
        table: Table,
        series_ids: &[String],
    ) -> anyhow::Result<Vec<String>>;

    /// Ids among `ids` that already have a row in `table`
    async fn existing_ids(&self, table: Table, ids: &[String]) -> anyhow::Result<Vec<String>>;

    /// Owner ids among `owner_ids` that already have item-info rows
    async fn item_info_owner_ids(&self, owner_ids: &[String]) -> anyhow::Result<Vec<String>>;

    async fn archived_series_ids(&self) -> anyhow::Result<Vec<String>>;

    async fn archived_season_ids(&self) -> anyhow::Result<Vec<String>>;

    // --- Housekeeping ---

    /// Deletes seasons/episodes without a series row and item info without
    /// an owner, in one transaction
    async fn remove_orphaned_data(&self) -> anyhow::Result<OrphanReport>;

    /// Deletes active episodes with no season
    async fn delete_unparented_episodes(&self) -> anyhow::Result<u64>;

    /// Recomputes per-library counters
    async fn update_library_stats(&self) -> anyhow::Result<()>;

    /// Rewrites activity user names that differ from the mirrored user
    async fn sync_playback_user_names(&self) -> anyhow::Result<u64>;

    // --- Activity migration ---

    /// Candidates ordered by old id then new id
    async fn item_migration_candidates(&self) -> anyhow::Result<Vec<ItemMigration>>;

    /// Candidates ordered by old episode id then new episode id
    async fn episode_migration_candidates(&self) -> anyhow::Result<Vec<EpisodeMigration>>;

    async fn apply_item_migrations(&self, migrations: &[ItemMigration]) -> anyhow::Result<u64>;

    async fn apply_episode_migrations(
        &self,
        migrations: &[EpisodeMigration],
    ) -> anyhow::Result<u64>;

    // --- Plugin import ---

    async fn activity_bounds(&self) -> anyhow::Result<ActivityBounds>;

    async fn max_plugin_rowid(&self) -> anyhow::Result<Option<i64>>;

    /// Folds staged plugin rows into playback activity; returns rows added
    async fn fold_imported_plugin_rows(&self) -> anyhow::Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episodes_are_keyed_by_episode_id() {
        assert_eq!(Table::Episodes.id_column(), Column::EpisodeId);
        assert_eq!(Table::Items.id_column(), Column::Id);
        assert_eq!(Table::PluginRows.id_column(), Column::RowId);
    }

    #[test]
    fn bulk_outcome_into_result() {
        assert_eq!(BulkOutcome::Success.into_result(), Ok(()));
        assert_eq!(
            BulkOutcome::Failure("disk full".into()).into_result(),
            Err("disk full".to_string())
        );
    }

    #[test]
    fn row_batch_reports_table_and_len() {
        let batch = RowBatch::Users(vec![]);
        assert_eq!(batch.table(), Table::Users);
        assert!(batch.is_empty());
    }
}
