//! Domain entities
//!
//! This module contains the core domain types for Jellymirror:
//! - Newtypes for type-safe identifiers
//! - Mirrored catalog rows (libraries, items, seasons, episodes, media info)
//! - Users and playback history
//! - Task runs, log lines and progress events
//! - Domain-specific error types

pub mod catalog;
pub mod errors;
pub mod newtypes;
pub mod task;

pub use catalog::{
    Episode, ImportedPluginRow, ItemInfo, Library, LibraryItem, LibraryStats, OwnerKind,
    PlaybackActivity, RecordKind, Season, User,
};
pub use errors::DomainError;
pub use newtypes::RunId;
pub use task::{
    LogLevel, LogLine, ProgressEvent, ProgressKind, TaskName, TaskRun, TaskState, TriggerType,
    TASK_ERROR_CHANNEL,
};
