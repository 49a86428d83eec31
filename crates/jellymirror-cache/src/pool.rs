//! Mirror database connection pool
//!
//! Opening a pool also brings the catalog schema up to date. The schema
//! version lives in SQLite's `user_version` header field:
//!
//! - `0` is a brand new file, or one written before versioning existed;
//!   the catalog DDL is idempotent, so both are upgraded in place
//! - [`SCHEMA_VERSION`] is current and nothing runs
//! - anything newer was written by a later release and is refused, since
//!   this build would silently drop columns it does not know about

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Catalog schema version this build reads and writes
pub const SCHEMA_VERSION: i64 = 1;

/// One sync writer plus the schedulers and CLI readers
const MAX_CONNECTIONS: u32 = 5;

/// Bulk upserts of a large library page hold the write lock for a while
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CATALOG_SCHEMA: &str = include_str!("migrations/20261001_catalog.sql");

/// Pool of SQLite connections shared by the engine, the schedulers and
/// the CLI
#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
    schema_version: i64,
}

impl DatabasePool {
    /// Opens (creating if needed) the mirror database at `db_path`
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the file cannot be opened,
    /// `CacheError::UnsupportedSchema` if it was written by a newer release,
    /// or `CacheError::MigrationFailed` if the schema upgrade fails.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to open mirror database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        let schema_version = Self::prepare(&pool).await?;
        tracing::info!(path = %db_path.display(), schema_version, "Mirror database opened");

        Ok(Self {
            pool,
            schema_version,
        })
    }

    /// Creates an in-memory mirror for tests
    ///
    /// Uses a single connection because SQLite in-memory databases are
    /// per-connection.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        let schema_version = Self::prepare(&pool).await?;

        Ok(Self {
            pool,
            schema_version,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schema version the file carries after opening
    pub fn schema_version(&self) -> i64 {
        self.schema_version
    }

    /// Checks the stored schema version and upgrades older files
    async fn prepare(pool: &SqlitePool) -> Result<i64, CacheError> {
        let (found,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to read schema version: {}", e))
            })?;

        if found > SCHEMA_VERSION {
            return Err(CacheError::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        if found == SCHEMA_VERSION {
            return Ok(found);
        }

        sqlx::raw_sql(CATALOG_SCHEMA)
            .execute(pool)
            .await
            .map_err(|e| {
                CacheError::MigrationFailed(format!("Failed to apply catalog schema: {}", e))
            })?;

        // PRAGMA arguments cannot be bound
        sqlx::raw_sql(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(pool)
            .await
            .map_err(|e| {
                CacheError::MigrationFailed(format!("Failed to stamp schema version: {}", e))
            })?;

        tracing::debug!(from = found, to = SCHEMA_VERSION, "Catalog schema upgraded");
        Ok(SCHEMA_VERSION)
    }
}
