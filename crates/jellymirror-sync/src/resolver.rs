//! Diff and archive resolver
//!
//! Pure set arithmetic used by the engine: routing a fetched page by record
//! kind, counting inserted versus rewritten rows, and computing which
//! active rows a full sync archives.

use std::collections::HashSet;
use std::ops::AddAssign;

use jellymirror_core::domain::RecordKind;
use jellymirror_core::ports::RemoteItem;

/// Inserted / updated counts for one entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    pub inserted: u64,
    pub updated: u64,
}

impl Counter {
    pub fn new(inserted: u64, updated: u64) -> Self {
        Self { inserted, updated }
    }

    /// Full sync: every fetched id is written; those already present count
    /// as updated.
    pub fn rewritten(batch: &[String], existing: &HashSet<String>) -> Self {
        let updated = batch.iter().filter(|id| existing.contains(*id)).count() as u64;
        Self::new(batch.len() as u64 - updated, updated)
    }

    /// Partial sync: only unseen ids are written
    pub fn inserted_only(written: usize) -> Self {
        Self::new(written as u64, 0)
    }
}

impl AddAssign for Counter {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
    }
}

/// One fetched page split by record kind
#[derive(Debug, Default)]
pub struct PageSplit<'a> {
    pub containers: Vec<&'a RemoteItem>,
    pub seasons: Vec<&'a RemoteItem>,
    pub episodes: Vec<&'a RemoteItem>,
}

impl<'a> PageSplit<'a> {
    pub fn from_page(page: &'a [RemoteItem]) -> Self {
        let mut split = PageSplit::default();
        for record in page {
            match RecordKind::classify(record.item_type.as_deref()) {
                RecordKind::Container => split.containers.push(record),
                RecordKind::Season => split.seasons.push(record),
                RecordKind::Episode => split.episodes.push(record),
                RecordKind::Other => {}
            }
        }
        split
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.seasons.is_empty() && self.episodes.is_empty()
    }
}

/// Keeps the ids of `rows` not present in `existing`
pub fn unseen<T, F>(rows: Vec<T>, existing: &HashSet<String>, id: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    rows.into_iter()
        .filter(|row| !existing.contains(id(row)))
        .collect()
}

/// Rows to write for one page of one entity kind
#[derive(Debug)]
pub struct BatchPlan<T> {
    pub rows: Vec<T>,
    pub counter: Counter,
    /// Every id present in the page, written or not
    pub fetched: Vec<String>,
}

/// Full sync rewrites every row; partial sync keeps only unseen ids
pub fn plan_batch<T, F>(
    rows: Vec<T>,
    existing: &HashSet<String>,
    rewrite: bool,
    id: F,
) -> BatchPlan<T>
where
    F: Fn(&T) -> &str,
{
    let fetched: Vec<String> = rows.iter().map(|row| id(row).to_string()).collect();
    if rewrite {
        let counter = Counter::rewritten(&fetched, existing);
        BatchPlan {
            rows,
            counter,
            fetched,
        }
    } else {
        let rows = unseen(rows, existing, id);
        BatchPlan {
            counter: Counter::inserted_only(rows.len()),
            rows,
            fetched,
        }
    }
}

/// `active − fetched − protected`, sorted for stable batches
pub fn archive_set(
    active: Vec<String>,
    fetched: &HashSet<String>,
    protected: &HashSet<String>,
) -> Vec<String> {
    let mut ids: Vec<String> = active
        .into_iter()
        .filter(|id| !fetched.contains(id) && !protected.contains(id))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
