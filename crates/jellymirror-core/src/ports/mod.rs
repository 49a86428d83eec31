//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IMediaSource`] - Remote media server (libraries, items, users, plugins)
//! - [`ICatalogStore`] - Bulk persistence gateway and housekeeping procedures
//! - [`ITaskLog`] - Durable task-run records
//! - [`IProgressSink`] - Live progress events per task channel

pub mod catalog_store;
pub mod media_source;
pub mod progress;
pub mod task_log;

pub use catalog_store::{
    ActivityBounds, BulkOutcome, Column, EpisodeMigration, FieldValue, ICatalogStore,
    ItemMigration, OrphanReport, RowBatch, Table,
};
pub use media_source::{
    IMediaSource, ItemQuery, PluginQueryResult, RemoteItem, RemoteLibrary, RemoteMediaSource,
    RemotePlugin, RemoteUser, RemoteUserPolicy,
};
pub use progress::IProgressSink;
pub use task_log::ITaskLog;
