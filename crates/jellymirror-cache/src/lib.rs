//! Jellymirror Cache - Local catalog persistence
//!
//! SQLite-based mirror for:
//! - Libraries, items, seasons, episodes and media-source info
//! - Users and playback activity
//! - Staged Playback Reporting plugin rows
//! - Task runs
//!
//! ## Architecture
//!
//! This crate implements the `ICatalogStore` and `ITaskLog` ports from
//! `jellymirror-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with versioned schema setup
//! - [`SqliteCatalogStore`] - `ICatalogStore` + `ITaskLog` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use jellymirror_cache::{DatabasePool, SqliteCatalogStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/jellymirror/jellymirror.db")).await?;
//! let store = SqliteCatalogStore::new(pool.pool().clone());
//! // Use store as ICatalogStore and ITaskLog...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;
pub mod task_log;

pub use pool::{DatabasePool, SCHEMA_VERSION};
pub use repository::SqliteCatalogStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// The database was written by a newer release
    #[error("Unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedSchema { found: i64, supported: i64 },

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
