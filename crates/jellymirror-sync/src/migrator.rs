//! Activity migration
//!
//! When an item is removed and re-added on the server it comes back under a
//! new id. Playback history still points at the archived id; this pass
//! re-points it at the active item carrying the same name (and, for
//! episodes, the same series name). Name matching is a heuristic: when
//! several active rows qualify, the first candidate in id order wins.

use std::collections::HashSet;

use jellymirror_core::ports::{EpisodeMigration, ICatalogStore, ItemMigration};
use tracing::info;

use crate::context::RunContext;
use crate::SyncError;

/// Keeps the first candidate per old item id
pub fn first_item_candidates(candidates: Vec<ItemMigration>) -> Vec<ItemMigration> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|m| seen.insert(m.old_item_id.clone()))
        .collect()
}

/// Keeps the first candidate per old episode id
pub fn first_episode_candidates(candidates: Vec<EpisodeMigration>) -> Vec<EpisodeMigration> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|m| seen.insert(m.old_episode_id.clone()))
        .collect()
}

/// Rewrites activity rows; returns `(item rows, episode rows)` changed
pub async fn migrate_activity(
    store: &dyn ICatalogStore,
    ctx: &mut RunContext,
) -> Result<(u64, u64), SyncError> {
    ctx.info("Migrating Archived Activity to New Items");

    let items = first_item_candidates(store.item_migration_candidates().await?);
    let episodes = first_episode_candidates(store.episode_migration_candidates().await?);

    let item_rows = if items.is_empty() {
        0
    } else {
        store.apply_item_migrations(&items).await?
    };
    let episode_rows = if episodes.is_empty() {
        0
    } else {
        store.apply_episode_migrations(&episodes).await?
    };

    if item_rows + episode_rows > 0 {
        info!(
            run_id = %ctx.run_id(),
            items = items.len(),
            episodes = episodes.len(),
            item_rows,
            episode_rows,
            "Migrated playback activity"
        );
    }
    ctx.info("Archived Activity Migrated to New Items Successfully.");
    Ok((item_rows, episode_rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(old: &str, new: &str) -> ItemMigration {
        ItemMigration {
            old_item_id: old.into(),
            new_item_id: new.into(),
        }
    }

    #[test]
    fn first_candidate_wins_per_old_id() {
        let picked = first_item_candidates(vec![
            item("m1", "m2"),
            item("m1", "m3"),
            item("x1", "x2"),
        ]);
        assert_eq!(picked, vec![item("m1", "m2"), item("x1", "x2")]);
    }

    #[test]
    fn episode_candidates_are_deduplicated() {
        let candidate = |new: &str| EpisodeMigration {
            old_episode_id: "e1".into(),
            episode_id: new.into(),
            season_id: Some("se2".into()),
            series_id: "s2".into(),
        };
        let picked = first_episode_candidates(vec![candidate("e2"), candidate("e3")]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].episode_id, "e2");
    }
}
