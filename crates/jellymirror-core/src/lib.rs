//! Jellymirror Core - Domain types and ports for the catalog mirror
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Library`, `LibraryItem`, `Season`, `Episode`, `ItemInfo`,
//!   `User`, `PlaybackActivity`, `TaskRun`
//! - **Record mapping** - pure translation of remote records into local rows
//! - **Port definitions** - Traits for adapters: `IMediaSource`, `ICatalogStore`,
//!   `ITaskLog`, `IProgressSink`
//! - **Configuration** - the YAML configuration file
//!
//! # Architecture
//!
//! The domain module holds plain data with no I/O. Ports define the trait
//! interfaces that the cache, client and audit crates implement, and the
//! sync crate drives them.

pub mod config;
pub mod domain;
pub mod mapping;
pub mod ports;
