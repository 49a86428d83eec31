//! Orphan and cascade reconciler
//!
//! Runs after the archive pass of a full sync. Each step commits before the
//! next one reads, so the cascade sees the rows the orphan cleanup left.

use jellymirror_core::ports::{Column, FieldValue, ICatalogStore, Table};
use tracing::debug;

use crate::context::RunContext;
use crate::SyncError;

/// Rows touched by one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub orphaned_seasons: u64,
    pub orphaned_episodes: u64,
    pub orphaned_item_info: u64,
    pub archived_series: usize,
    pub archived_seasons: usize,
    pub unparented_episodes: u64,
}

/// Orphan cleanup, series cascade, season cascade, then removal of active
/// episodes that have no season.
pub async fn reconcile(
    store: &dyn ICatalogStore,
    ctx: &mut RunContext,
) -> Result<ReconcileSummary, SyncError> {
    ctx.info("Removing Orphaned FileInfo/Episode/Season Records");

    let orphans = store.remove_orphaned_data().await?;

    let archived_series = store.archived_series_ids().await?;
    if !archived_series.is_empty() {
        for table in [Table::Seasons, Table::Episodes] {
            SyncError::check_bulk(
                store
                    .set_field(
                        table,
                        &archived_series,
                        Column::Archived,
                        FieldValue::Bool(true),
                        Column::SeriesId,
                    )
                    .await,
                table,
                "archive cascade",
            )?;
        }
    }

    let archived_seasons = store.archived_season_ids().await?;
    if !archived_seasons.is_empty() {
        SyncError::check_bulk(
            store
                .set_field(
                    Table::Episodes,
                    &archived_seasons,
                    Column::Archived,
                    FieldValue::Bool(true),
                    Column::SeasonId,
                )
                .await,
            Table::Episodes,
            "archive cascade",
        )?;
    }

    let unparented_episodes = store.delete_unparented_episodes().await?;

    let summary = ReconcileSummary {
        orphaned_seasons: orphans.seasons,
        orphaned_episodes: orphans.episodes,
        orphaned_item_info: orphans.item_info,
        archived_series: archived_series.len(),
        archived_seasons: archived_seasons.len(),
        unparented_episodes,
    };
    debug!(run_id = %ctx.run_id(), ?summary, "Reconciliation finished");

    if unparented_episodes > 0 {
        ctx.warning(format!(
            "{unparented_episodes} Episodes without a Season Removed."
        ));
    }
    ctx.info("Orphaned FileInfo/Episode/Season Removed.");
    Ok(summary)
}
