//! Jellymirror Sync - Catalog reconciliation engine
//!
//! Provides:
//! - Full and partial (recently added) catalog synchronization
//! - Archive-instead-of-delete reconciliation with cascade and orphan cleanup
//! - Migration of playback history onto re-added items
//! - Playback Reporting plugin import
//! - Poll-based schedulers with durable mutual exclusion
//!
//! ## Modules
//!
//! - [`engine`] - Orchestrator running one task kind end to end
//! - [`context`] - Per-run state threaded through every phase
//! - [`resolver`] - Page splitting, counters and archive set arithmetic
//! - [`reconciler`] - Orphan cleanup and archive cascade
//! - [`migrator`] - Activity migration onto replacement items
//! - [`plugin`] - Playback Reporting query construction
//! - [`scheduler`] - Interval schedulers for full and partial sync

pub mod context;
pub mod engine;
pub mod migrator;
pub mod plugin;
pub mod reconciler;
pub mod resolver;
pub mod scheduler;

pub use engine::{ReconciliationEngine, RunReport};
pub use scheduler::TaskScheduler;

use std::panic::Location;

use jellymirror_core::domain::TaskName;
use jellymirror_core::ports::{BulkOutcome, Table};
use thiserror::Error;

/// Errors that end a run
#[derive(Debug, Error)]
pub enum SyncError {
    /// Server URL or API key is not configured
    #[error("Jellyfin server URL and API key must be configured")]
    ConfigurationMissing,

    /// The server returned no libraries at all
    #[error("No libraries found to sync")]
    EmptyCatalog,

    /// A bulk gateway call reported failure
    #[error("Bulk {operation} on {table} failed: {message}")]
    BulkOperationFailure {
        table: Table,
        operation: &'static str,
        message: String,
    },

    /// A conflicting run is already in progress
    #[error("Sync is already running ({requested} rejected)")]
    ConcurrentRunConflict { requested: TaskName },

    /// Any other failure, tagged with the call site that raised it
    #[error("{location}: Error: {message}")]
    Unclassified { location: String, message: String },
}

impl SyncError {
    /// Turns a non-success bulk outcome into an error
    pub(crate) fn check_bulk(
        outcome: BulkOutcome,
        table: Table,
        operation: &'static str,
    ) -> Result<(), SyncError> {
        outcome
            .into_result()
            .map_err(|message| SyncError::BulkOperationFailure {
                table,
                operation,
                message,
            })
    }
}

impl From<anyhow::Error> for SyncError {
    #[track_caller]
    fn from(err: anyhow::Error) -> Self {
        let location = Location::caller();
        SyncError::Unclassified {
            location: format!("{}:{}", location.file(), location.line()),
            message: format!("{err:#}"),
        }
    }
}
