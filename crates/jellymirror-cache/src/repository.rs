//! SQLite implementation of ICatalogStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! catalog store port defined in jellymirror-core: the bulk persistence
//! gateway, id lookups and the housekeeping procedures.
//!
//! ## Type Mapping
//!
//! | Domain Type         | SQL Type | Strategy                                   |
//! |---------------------|----------|--------------------------------------------|
//! | Remote ids          | TEXT     | Stored as received                         |
//! | `archived`, flags   | INTEGER  | 0 / 1                                      |
//! | DateTime<Utc>       | TEXT     | RFC 3339, microseconds, `Z` suffix         |
//! | OwnerKind           | TEXT     | `Item` / `Episode`                         |
//! | Media streams       | TEXT     | serde_json array                           |
//!
//! Bulk writes are chunked so that a single statement never exceeds SQLite's
//! bind-parameter limit, and all chunks of one call share a transaction.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, warn};

use jellymirror_core::domain::{
    Episode, ImportedPluginRow, ItemInfo, Library, LibraryItem, LibraryStats, PlaybackActivity,
    Season, User,
};
use jellymirror_core::ports::{
    ActivityBounds, BulkOutcome, Column, EpisodeMigration, FieldValue, ICatalogStore,
    ItemMigration, OrphanReport, RowBatch, Table,
};

use crate::CacheError;

/// Rows or ids per statement
const CHUNK_SIZE: usize = 500;

/// SQLite-based implementation of the catalog store and task log ports
#[derive(Clone)]
pub struct SqliteCatalogStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteCatalogStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("Invalid datetime '{}': {}", s, e)))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    s.as_deref().map(parse_datetime).transpose()
}

fn activity_from_row(row: &SqliteRow) -> Result<PlaybackActivity, CacheError> {
    let activity_date: String = row.try_get("activity_date")?;
    Ok(PlaybackActivity {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        user_name: row.try_get("user_name")?,
        now_playing_item_id: row.try_get("now_playing_item_id")?,
        now_playing_item_name: row.try_get("now_playing_item_name")?,
        season_id: row.try_get("season_id")?,
        episode_id: row.try_get("episode_id")?,
        series_name: row.try_get("series_name")?,
        client: row.try_get("client")?,
        device_name: row.try_get("device_name")?,
        play_method: row.try_get("play_method")?,
        play_duration_secs: row.try_get("play_duration_secs")?,
        activity_date: parse_datetime(&activity_date)?,
    })
}

fn stats_from_row(row: &SqliteRow) -> Result<LibraryStats, CacheError> {
    Ok(LibraryStats {
        library_id: row.try_get("id")?,
        library_name: row.try_get("name")?,
        item_count: row.try_get("item_count")?,
        season_count: row.try_get("season_count")?,
        episode_count: row.try_get("episode_count")?,
        total_play_seconds: row.try_get("total_play_seconds")?,
    })
}

/// Appends ` IN (?, ?, ...)` for `ids`
fn push_in_list<'a>(qb: &mut QueryBuilder<'a, Sqlite>, ids: &'a [String]) {
    qb.push(" IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");
}

// ============================================================================
// Bulk upserts, one per table
// ============================================================================

async fn upsert_libraries(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[Library],
) -> Result<(), CacheError> {
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO libraries (id, name, collection_type, archived) ");
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(&row.id)
                .push_bind(&row.name)
                .push_bind(&row.collection_type)
                .push_bind(row.archived);
        });
        qb.push(
            " ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
             collection_type = excluded.collection_type, archived = excluded.archived",
        );
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn upsert_items(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[LibraryItem],
) -> Result<(), CacheError> {
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO library_items (id, name, parent_id, item_type, production_year, \
             path, run_time_ticks, date_created, archived) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(&row.id)
                .push_bind(&row.name)
                .push_bind(&row.parent_id)
                .push_bind(&row.item_type)
                .push_bind(row.production_year)
                .push_bind(&row.path)
                .push_bind(row.run_time_ticks)
                .push_bind(row.date_created.as_ref().map(format_datetime))
                .push_bind(row.archived);
        });
        qb.push(
            " ON CONFLICT(id) DO UPDATE SET name = excluded.name, parent_id = excluded.parent_id, \
             item_type = excluded.item_type, production_year = excluded.production_year, \
             path = excluded.path, run_time_ticks = excluded.run_time_ticks, \
             date_created = excluded.date_created, archived = excluded.archived",
        );
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn upsert_seasons(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[Season],
) -> Result<(), CacheError> {
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO library_seasons (id, name, series_id, series_name, index_number, archived) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(&row.id)
                .push_bind(&row.name)
                .push_bind(&row.series_id)
                .push_bind(&row.series_name)
                .push_bind(row.index_number)
                .push_bind(row.archived);
        });
        qb.push(
            " ON CONFLICT(id) DO UPDATE SET name = excluded.name, series_id = excluded.series_id, \
             series_name = excluded.series_name, index_number = excluded.index_number, \
             archived = excluded.archived",
        );
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn upsert_episodes(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[Episode],
) -> Result<(), CacheError> {
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO library_episodes (episode_id, name, season_id, series_id, series_name, \
             season_name, index_number, parent_index_number, archived) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(&row.episode_id)
                .push_bind(&row.name)
                .push_bind(&row.season_id)
                .push_bind(&row.series_id)
                .push_bind(&row.series_name)
                .push_bind(&row.season_name)
                .push_bind(row.index_number)
                .push_bind(row.parent_index_number)
                .push_bind(row.archived);
        });
        qb.push(
            " ON CONFLICT(episode_id) DO UPDATE SET name = excluded.name, \
             season_id = excluded.season_id, series_id = excluded.series_id, \
             series_name = excluded.series_name, season_name = excluded.season_name, \
             index_number = excluded.index_number, \
             parent_index_number = excluded.parent_index_number, archived = excluded.archived",
        );
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn upsert_item_info(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[ItemInfo],
) -> Result<(), CacheError> {
    for chunk in rows.chunks(CHUNK_SIZE) {
        let streams = chunk
            .iter()
            .map(|row| serde_json::to_string(&row.media_streams))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO item_info (id, owner_id, owner_kind, path, name, size, bitrate, \
             media_streams) ",
        );
        qb.push_values(chunk.iter().zip(streams), |mut b, (row, streams)| {
            b.push_bind(&row.id)
                .push_bind(&row.owner_id)
                .push_bind(row.owner_kind.as_str())
                .push_bind(&row.path)
                .push_bind(&row.name)
                .push_bind(row.size)
                .push_bind(row.bitrate)
                .push_bind(streams);
        });
        qb.push(
            " ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, \
             owner_kind = excluded.owner_kind, path = excluded.path, name = excluded.name, \
             size = excluded.size, bitrate = excluded.bitrate, \
             media_streams = excluded.media_streams",
        );
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn upsert_users(tx: &mut Transaction<'_, Sqlite>, rows: &[User]) -> Result<(), CacheError> {
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO users (id, name, is_administrator, last_login_date, last_activity_date) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(&row.id)
                .push_bind(&row.name)
                .push_bind(row.is_administrator)
                .push_bind(row.last_login_date.as_ref().map(format_datetime))
                .push_bind(row.last_activity_date.as_ref().map(format_datetime));
        });
        qb.push(
            " ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
             is_administrator = excluded.is_administrator, \
             last_login_date = excluded.last_login_date, \
             last_activity_date = excluded.last_activity_date",
        );
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn upsert_activity(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[PlaybackActivity],
) -> Result<(), CacheError> {
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO playback_activity (id, user_id, user_name, now_playing_item_id, \
             now_playing_item_name, season_id, episode_id, series_name, client, device_name, \
             play_method, play_duration_secs, activity_date) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(&row.id)
                .push_bind(&row.user_id)
                .push_bind(&row.user_name)
                .push_bind(&row.now_playing_item_id)
                .push_bind(&row.now_playing_item_name)
                .push_bind(&row.season_id)
                .push_bind(&row.episode_id)
                .push_bind(&row.series_name)
                .push_bind(&row.client)
                .push_bind(&row.device_name)
                .push_bind(&row.play_method)
                .push_bind(row.play_duration_secs)
                .push_bind(format_datetime(&row.activity_date));
        });
        qb.push(
            " ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id, \
             user_name = excluded.user_name, now_playing_item_id = excluded.now_playing_item_id, \
             now_playing_item_name = excluded.now_playing_item_name, \
             season_id = excluded.season_id, episode_id = excluded.episode_id, \
             series_name = excluded.series_name, client = excluded.client, \
             device_name = excluded.device_name, play_method = excluded.play_method, \
             play_duration_secs = excluded.play_duration_secs, \
             activity_date = excluded.activity_date",
        );
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn upsert_plugin_rows(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[ImportedPluginRow],
) -> Result<(), CacheError> {
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO plugin_playback_rows (plugin_rowid, date_created, user_id, item_id, \
             item_type, item_name, play_method, client_name, device_name, play_duration) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.rowid)
                .push_bind(row.date_created.as_ref().map(format_datetime))
                .push_bind(&row.user_id)
                .push_bind(&row.item_id)
                .push_bind(&row.item_type)
                .push_bind(&row.item_name)
                .push_bind(&row.play_method)
                .push_bind(&row.client_name)
                .push_bind(&row.device_name)
                .push_bind(row.play_duration);
        });
        qb.push(
            " ON CONFLICT(plugin_rowid) DO UPDATE SET date_created = excluded.date_created, \
             user_id = excluded.user_id, item_id = excluded.item_id, \
             item_type = excluded.item_type, item_name = excluded.item_name, \
             play_method = excluded.play_method, client_name = excluded.client_name, \
             device_name = excluded.device_name, play_duration = excluded.play_duration",
        );
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

// ============================================================================
// Fallible bodies behind the BulkOutcome surface
// ============================================================================

impl SqliteCatalogStore {
    async fn try_upsert(&self, batch: &RowBatch) -> Result<(), CacheError> {
        let mut tx = self.pool.begin().await?;
        match batch {
            RowBatch::Libraries(rows) => upsert_libraries(&mut tx, rows).await?,
            RowBatch::Items(rows) => upsert_items(&mut tx, rows).await?,
            RowBatch::Seasons(rows) => upsert_seasons(&mut tx, rows).await?,
            RowBatch::Episodes(rows) => upsert_episodes(&mut tx, rows).await?,
            RowBatch::ItemInfo(rows) => upsert_item_info(&mut tx, rows).await?,
            RowBatch::Users(rows) => upsert_users(&mut tx, rows).await?,
            RowBatch::PlaybackActivity(rows) => upsert_activity(&mut tx, rows).await?,
            RowBatch::PluginRows(rows) => upsert_plugin_rows(&mut tx, rows).await?,
        }
        tx.commit().await?;
        Ok(())
    }

    async fn try_delete(&self, table: Table, ids: &[String]) -> Result<u64, CacheError> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for chunk in ids.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM ");
            qb.push(table.name())
                .push(" WHERE ")
                .push(table.id_column().name());
            push_in_list(&mut qb, chunk);
            affected += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn try_set_field(
        &self,
        table: Table,
        ids: &[String],
        column: Column,
        value: &FieldValue,
        key: Column,
    ) -> Result<u64, CacheError> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for chunk in ids.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE ");
            qb.push(table.name())
                .push(" SET ")
                .push(column.name())
                .push(" = ");
            match value {
                FieldValue::Bool(b) => qb.push_bind(*b),
                FieldValue::Text(s) => qb.push_bind(s.as_str()),
            };
            qb.push(" WHERE ").push(key.name());
            push_in_list(&mut qb, chunk);
            affected += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn select_ids(&self, sql: &str) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(CacheError::from))
            .collect()
    }

    /// Runs `select WHERE key IN (ids) extra` chunk by chunk
    async fn select_ids_in(
        &self,
        select: &str,
        key: &str,
        ids: &[String],
        extra: &str,
    ) -> Result<Vec<String>, CacheError> {
        let mut out = Vec::new();
        for chunk in ids.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(select);
            qb.push(" WHERE ").push(key);
            push_in_list(&mut qb, chunk);
            qb.push(extra);
            let rows = qb.build().fetch_all(&self.pool).await?;
            for row in rows {
                out.push(row.try_get::<String, _>(0)?);
            }
        }
        Ok(out)
    }
}

// ============================================================================
// Inspection queries
// ============================================================================

/// Read-side queries used by the CLI and by tests; the engine never reads
/// rows back this way.
impl SqliteCatalogStore {
    /// `Some(archived)` for an existing row, `None` when absent
    pub async fn archived_flag(&self, table: Table, id: &str) -> anyhow::Result<Option<bool>> {
        if !table.is_archivable() {
            anyhow::bail!("table {} has no archived flag", table);
        }
        let sql = format!(
            "SELECT archived FROM {} WHERE {} = ?",
            table.name(),
            table.id_column().name()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;
        match row {
            Some(row) => Ok(Some(row.try_get::<bool, _>(0).map_err(CacheError::from)?)),
            None => Ok(None),
        }
    }

    pub async fn count_rows(&self, table: Table) -> anyhow::Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(count)
    }

    pub async fn library_stats(&self) -> anyhow::Result<Vec<LibraryStats>> {
        let rows = sqlx::query(
            "SELECT id, name, item_count, season_count, episode_count, total_play_seconds \
             FROM libraries WHERE archived = 0 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;
        Ok(rows
            .iter()
            .map(stats_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn playback_activity(&self) -> anyhow::Result<Vec<PlaybackActivity>> {
        let rows = sqlx::query("SELECT * FROM playback_activity ORDER BY activity_date, id")
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(rows
            .iter()
            .map(activity_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

// ============================================================================
// ICatalogStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ICatalogStore for SqliteCatalogStore {
    // --- Bulk gateway ---

    async fn upsert_many(&self, batch: RowBatch) -> BulkOutcome {
        if batch.is_empty() {
            return BulkOutcome::Success;
        }
        let table = batch.table();
        match self.try_upsert(&batch).await {
            Ok(()) => {
                debug!(table = %table, rows = batch.len(), "Bulk upsert committed");
                BulkOutcome::Success
            }
            Err(e) => {
                warn!(table = %table, rows = batch.len(), error = %e, "Bulk upsert failed");
                BulkOutcome::Failure(e.to_string())
            }
        }
    }

    async fn delete_many(&self, table: Table, ids: &[String]) -> BulkOutcome {
        if ids.is_empty() {
            return BulkOutcome::Success;
        }
        match self.try_delete(table, ids).await {
            Ok(deleted) => {
                debug!(table = %table, deleted, "Bulk delete committed");
                BulkOutcome::Success
            }
            Err(e) => {
                warn!(table = %table, error = %e, "Bulk delete failed");
                BulkOutcome::Failure(e.to_string())
            }
        }
    }

    async fn set_field(
        &self,
        table: Table,
        ids: &[String],
        column: Column,
        value: FieldValue,
        key: Column,
    ) -> BulkOutcome {
        if ids.is_empty() {
            return BulkOutcome::Success;
        }
        match self.try_set_field(table, ids, column, &value, key).await {
            Ok(updated) => {
                debug!(
                    table = %table,
                    column = column.name(),
                    key = key.name(),
                    updated,
                    "Bulk field update committed"
                );
                BulkOutcome::Success
            }
            Err(e) => {
                warn!(table = %table, column = column.name(), error = %e, "Bulk field update failed");
                BulkOutcome::Failure(e.to_string())
            }
        }
    }

    // --- Id lookups ---

    async fn all_ids(&self, table: Table) -> anyhow::Result<Vec<String>> {
        let sql = format!(
            "SELECT CAST({} AS TEXT) FROM {}",
            table.id_column().name(),
            table.name()
        );
        Ok(self.select_ids(&sql).await?)
    }

    async fn active_ids(&self, table: Table) -> anyhow::Result<Vec<String>> {
        if !table.is_archivable() {
            anyhow::bail!("table {} has no archived flag", table);
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE archived = 0",
            table.id_column().name(),
            table.name()
        );
        Ok(self.select_ids(&sql).await?)
    }

    async fn active_item_ids_in_libraries(
        &self,
        library_ids: &[String],
    ) -> anyhow::Result<Vec<String>> {
        Ok(self
            .select_ids_in(
                "SELECT id FROM library_items",
                "parent_id",
                library_ids,
                " AND archived = 0",
            )
            .await?)
    }

    async fn item_ids_in_libraries(
        &self,
        library_ids: &[String],
    ) -> anyhow::Result<Vec<String>> {
        Ok(self
            .select_ids_in("SELECT id FROM library_items", "parent_id", library_ids, "")
            .await?)
    }

    async fn ids_by_series(
        &self,
        table: Table,
        series_ids: &[String],
    ) -> anyhow::Result<Vec<String>> {
        let select = match table {
            Table::Seasons => "SELECT id FROM library_seasons",
            Table::Episodes => "SELECT episode_id FROM library_episodes",
            other => anyhow::bail!("table {} is not keyed by series", other),
        };
        Ok(self.select_ids_in(select, "series_id", series_ids, "").await?)
    }

    async fn existing_ids(&self, table: Table, ids: &[String]) -> anyhow::Result<Vec<String>> {
        let select = format!("SELECT {} FROM {}", table.id_column().name(), table.name());
        Ok(self
            .select_ids_in(&select, table.id_column().name(), ids, "")
            .await?)
    }

    async fn item_info_owner_ids(&self, owner_ids: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(self
            .select_ids_in(
                "SELECT DISTINCT owner_id FROM item_info",
                "owner_id",
                owner_ids,
                "",
            )
            .await?)
    }

    async fn archived_series_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .select_ids("SELECT id FROM library_items WHERE archived = 1 AND item_type = 'Series'")
            .await?)
    }

    async fn archived_season_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .select_ids("SELECT id FROM library_seasons WHERE archived = 1")
            .await?)
    }

    // --- Housekeeping ---

    async fn remove_orphaned_data(&self) -> anyhow::Result<OrphanReport> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;

        let seasons = sqlx::query(
            "DELETE FROM library_seasons WHERE series_id NOT IN (SELECT id FROM library_items)",
        )
        .execute(&mut *tx)
        .await
        .map_err(CacheError::from)?
        .rows_affected();

        let episodes = sqlx::query(
            "DELETE FROM library_episodes WHERE series_id NOT IN (SELECT id FROM library_items)",
        )
        .execute(&mut *tx)
        .await
        .map_err(CacheError::from)?
        .rows_affected();

        let item_info = sqlx::query(
            "DELETE FROM item_info WHERE \
             (owner_kind = 'Item' AND owner_id NOT IN (SELECT id FROM library_items)) \
             OR (owner_kind = 'Episode' AND owner_id NOT IN (SELECT episode_id FROM library_episodes))",
        )
        .execute(&mut *tx)
        .await
        .map_err(CacheError::from)?
        .rows_affected();

        tx.commit().await.map_err(CacheError::from)?;

        debug!(seasons, episodes, item_info, "Orphaned rows removed");
        Ok(OrphanReport {
            seasons,
            episodes,
            item_info,
        })
    }

    async fn delete_unparented_episodes(&self) -> anyhow::Result<u64> {
        let result =
            sqlx::query("DELETE FROM library_episodes WHERE season_id IS NULL AND archived = 0")
                .execute(&self.pool)
                .await
                .map_err(CacheError::from)?;
        Ok(result.rows_affected())
    }

    async fn update_library_stats(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE libraries SET
                item_count = (
                    SELECT COUNT(*) FROM library_items i
                    WHERE i.parent_id = libraries.id AND i.archived = 0
                ),
                season_count = (
                    SELECT COUNT(*) FROM library_seasons s
                    JOIN library_items i ON i.id = s.series_id
                    WHERE i.parent_id = libraries.id AND s.archived = 0
                ),
                episode_count = (
                    SELECT COUNT(*) FROM library_episodes e
                    JOIN library_items i ON i.id = e.series_id
                    WHERE i.parent_id = libraries.id AND e.archived = 0
                ),
                total_play_seconds = (
                    SELECT COALESCE(SUM(a.play_duration_secs), 0) FROM playback_activity a
                    JOIN library_items i ON i.id = a.now_playing_item_id
                    WHERE i.parent_id = libraries.id
                )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;
        Ok(())
    }

    async fn sync_playback_user_names(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE playback_activity
            SET user_name = (SELECT u.name FROM users u WHERE u.id = playback_activity.user_id)
            WHERE EXISTS (
                SELECT 1 FROM users u
                WHERE u.id = playback_activity.user_id
                  AND (playback_activity.user_name IS NULL OR u.name <> playback_activity.user_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;
        Ok(result.rows_affected())
    }

    // --- Activity migration ---

    async fn item_migration_candidates(&self) -> anyhow::Result<Vec<ItemMigration>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT a.now_playing_item_id AS old_item_id, i.id AS new_item_id
            FROM playback_activity a
            JOIN library_items i
              ON a.now_playing_item_name = i.name
             AND a.now_playing_item_id <> i.id
             AND i.archived = 0
            WHERE a.episode_id IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM library_items x
                  WHERE x.id = a.now_playing_item_id AND x.archived = 0
              )
            ORDER BY old_item_id, new_item_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        let migrations = rows
            .iter()
            .map(|row| -> Result<ItemMigration, CacheError> {
                Ok(ItemMigration {
                    old_item_id: row.try_get("old_item_id")?,
                    new_item_id: row.try_get("new_item_id")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(migrations)
    }

    async fn episode_migration_candidates(&self) -> anyhow::Result<Vec<EpisodeMigration>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT a.episode_id AS old_episode_id, e.episode_id, e.season_id, e.series_id
            FROM playback_activity a
            JOIN library_episodes e
              ON a.now_playing_item_name = e.name
             AND a.series_name = e.series_name
             AND a.episode_id <> e.episode_id
             AND e.archived = 0
            WHERE a.episode_id IS NOT NULL
              AND NOT EXISTS (
                  SELECT 1 FROM library_episodes x
                  WHERE x.episode_id = a.episode_id AND x.archived = 0
              )
            ORDER BY old_episode_id, e.episode_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        let migrations = rows
            .iter()
            .map(|row| -> Result<EpisodeMigration, CacheError> {
                Ok(EpisodeMigration {
                    old_episode_id: row.try_get("old_episode_id")?,
                    episode_id: row.try_get("episode_id")?,
                    season_id: row.try_get("season_id")?,
                    series_id: row.try_get("series_id")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(migrations)
    }

    async fn apply_item_migrations(&self, migrations: &[ItemMigration]) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        let mut rewritten = 0;
        for m in migrations {
            rewritten += sqlx::query(
                "UPDATE playback_activity SET now_playing_item_id = ? \
                 WHERE now_playing_item_id = ? AND episode_id IS NULL",
            )
            .bind(&m.new_item_id)
            .bind(&m.old_item_id)
            .execute(&mut *tx)
            .await
            .map_err(CacheError::from)?
            .rows_affected();
        }
        tx.commit().await.map_err(CacheError::from)?;
        Ok(rewritten)
    }

    async fn apply_episode_migrations(
        &self,
        migrations: &[EpisodeMigration],
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        let mut rewritten = 0;
        for m in migrations {
            rewritten += sqlx::query(
                "UPDATE playback_activity SET episode_id = ?, season_id = ?, \
                 now_playing_item_id = ? WHERE episode_id = ?",
            )
            .bind(&m.episode_id)
            .bind(&m.season_id)
            .bind(&m.series_id)
            .bind(&m.old_episode_id)
            .execute(&mut *tx)
            .await
            .map_err(CacheError::from)?
            .rows_affected();
        }
        tx.commit().await.map_err(CacheError::from)?;
        Ok(rewritten)
    }

    // --- Plugin import ---

    async fn activity_bounds(&self) -> anyhow::Result<ActivityBounds> {
        let row = sqlx::query(
            "SELECT MIN(activity_date) AS oldest, MAX(activity_date) AS newest \
             FROM playback_activity",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(CacheError::from)?;

        Ok(ActivityBounds {
            oldest: parse_optional_datetime(row.try_get("oldest").map_err(CacheError::from)?)?,
            newest: parse_optional_datetime(row.try_get("newest").map_err(CacheError::from)?)?,
        })
    }

    async fn max_plugin_rowid(&self) -> anyhow::Result<Option<i64>> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(plugin_rowid) FROM plugin_playback_rows")
                .fetch_one(&self.pool)
                .await
                .map_err(CacheError::from)?;
        Ok(max)
    }

    async fn fold_imported_plugin_rows(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO playback_activity (
                id, user_id, user_name, now_playing_item_id, now_playing_item_name,
                season_id, episode_id, series_name, client, device_name, play_method,
                play_duration_secs, activity_date
            )
            SELECT
                'plugin:' || p.plugin_rowid,
                COALESCE(p.user_id, ''),
                u.name,
                COALESCE(e.series_id, p.item_id, ''),
                COALESCE(e.name, p.item_name, ''),
                e.season_id,
                e.episode_id,
                e.series_name,
                p.client_name,
                p.device_name,
                p.play_method,
                p.play_duration,
                p.date_created
            FROM plugin_playback_rows p
            LEFT JOIN library_episodes e ON e.episode_id = p.item_id
            LEFT JOIN users u ON u.id = p.user_id
            WHERE p.date_created IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;
        Ok(result.rows_affected())
    }
}
