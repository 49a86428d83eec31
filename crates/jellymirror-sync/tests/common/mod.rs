//! Shared fixtures: an in-process media source, a recording progress sink
//! and an engine wired to an in-memory SQLite store.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use jellymirror_cache::{DatabasePool, SqliteCatalogStore};
use jellymirror_core::domain::{LogLine, ProgressEvent, TaskName, TaskRun};
use jellymirror_core::ports::{
    ActivityBounds, BulkOutcome, Column, EpisodeMigration, FieldValue, ICatalogStore,
    IMediaSource, IProgressSink, ITaskLog, ItemMigration, ItemQuery, OrphanReport,
    PluginQueryResult, RemoteItem, RemoteLibrary, RemoteMediaSource, RemotePlugin, RemoteUser,
    RowBatch, Table,
};
use jellymirror_sync::engine::SyncSettings;
use jellymirror_sync::ReconciliationEngine;

// ============================================================================
// Fake media source
// ============================================================================

#[derive(Default)]
struct FakeState {
    libraries: Vec<RemoteLibrary>,
    items: HashMap<String, Vec<RemoteItem>>,
    /// Ids returned when a query carries `min_date_last_saved`
    recent: HashSet<String>,
    users: Vec<RemoteUser>,
    plugins: Vec<RemotePlugin>,
    plugin_result: PluginQueryResult,
    item_queries: Vec<ItemQuery>,
    plugin_queries: Vec<String>,
    fail_items: bool,
}

/// Media server double serving whatever catalog the test sets up
#[derive(Default)]
pub struct FakeMediaSource {
    state: Mutex<FakeState>,
    /// Held by a test to park a run inside `list_users`
    pub gate: tokio::sync::Mutex<()>,
}

impl FakeMediaSource {
    pub fn set_libraries(&self, libraries: &[(&str, &str)]) {
        self.state.lock().unwrap().libraries = libraries
            .iter()
            .map(|(id, name)| RemoteLibrary {
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                collection_type: None,
            })
            .collect();
    }

    pub fn set_items(&self, library_id: &str, items: Vec<RemoteItem>) {
        self.state
            .lock()
            .unwrap()
            .items
            .insert(library_id.to_string(), items);
    }

    pub fn mark_recent(&self, ids: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.recent = ids.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_users(&self, users: &[(&str, &str)]) {
        self.state.lock().unwrap().users = users
            .iter()
            .map(|(id, name)| RemoteUser {
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            })
            .collect();
    }

    pub fn set_plugins(&self, config_files: &[&str]) {
        self.state.lock().unwrap().plugins = config_files
            .iter()
            .map(|file| RemotePlugin {
                name: Some("Plugin".into()),
                version: Some("1.0.0.0".into()),
                configuration_file_name: Some(file.to_string()),
            })
            .collect();
    }

    pub fn set_plugin_result(&self, result: PluginQueryResult) {
        self.state.lock().unwrap().plugin_result = result;
    }

    pub fn fail_item_listing(&self) {
        self.state.lock().unwrap().fail_items = true;
    }

    pub fn item_queries(&self) -> Vec<ItemQuery> {
        self.state.lock().unwrap().item_queries.clone()
    }

    pub fn plugin_queries(&self) -> Vec<String> {
        self.state.lock().unwrap().plugin_queries.clone()
    }
}

#[async_trait]
impl IMediaSource for FakeMediaSource {
    async fn list_libraries(&self) -> anyhow::Result<Vec<RemoteLibrary>> {
        Ok(self.state.lock().unwrap().libraries.clone())
    }

    async fn list_items(&self, query: &ItemQuery) -> anyhow::Result<Vec<RemoteItem>> {
        let mut state = self.state.lock().unwrap();
        state.item_queries.push(query.clone());
        if state.fail_items {
            anyhow::bail!("connection reset by peer");
        }
        let items = state.items.get(&query.parent_id).cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .filter(|item| {
                query.min_date_last_saved.is_none()
                    || item
                        .id
                        .as_ref()
                        .is_some_and(|id| state.recent.contains(id))
            })
            .skip(query.start_index as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<RemoteUser>> {
        let _open = self.gate.lock().await;
        Ok(self.state.lock().unwrap().users.clone())
    }

    async fn list_installed_plugins(&self) -> anyhow::Result<Vec<RemotePlugin>> {
        Ok(self.state.lock().unwrap().plugins.clone())
    }

    async fn run_plugin_query(&self, sql: &str) -> anyhow::Result<PluginQueryResult> {
        let mut state = self.state.lock().unwrap();
        state.plugin_queries.push(sql.to_string());
        Ok(state.plugin_result.clone())
    }
}

// ============================================================================
// Recording progress sink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, ProgressEvent)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(String, ProgressEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn on_channel(&self, channel: &str) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, e)| e)
            .collect()
    }
}

impl IProgressSink for RecordingSink {
    fn send(&self, channel: &str, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap()
            .push((channel.to_string(), event));
    }
}

// ============================================================================
// Store with an injected bulk failure
// ============================================================================

/// Delegates to SQLite but reports `Failure` for `set_field` on one table
pub struct FailingSetFieldStore {
    inner: Arc<SqliteCatalogStore>,
    table: Table,
    message: String,
}

impl FailingSetFieldStore {
    pub fn new(inner: Arc<SqliteCatalogStore>, table: Table, message: &str) -> Self {
        Self {
            inner,
            table,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ICatalogStore for FailingSetFieldStore {
    async fn upsert_many(&self, batch: RowBatch) -> BulkOutcome {
        self.inner.upsert_many(batch).await
    }

    async fn delete_many(&self, table: Table, ids: &[String]) -> BulkOutcome {
        self.inner.delete_many(table, ids).await
    }

    async fn set_field(
        &self,
        table: Table,
        ids: &[String],
        column: Column,
        value: FieldValue,
        key: Column,
    ) -> BulkOutcome {
        if table == self.table {
            return BulkOutcome::Failure(self.message.clone());
        }
        self.inner.set_field(table, ids, column, value, key).await
    }

    async fn all_ids(&self, table: Table) -> anyhow::Result<Vec<String>> {
        self.inner.all_ids(table).await
    }

    async fn active_ids(&self, table: Table) -> anyhow::Result<Vec<String>> {
        self.inner.active_ids(table).await
    }

    async fn active_item_ids_in_libraries(
        &self,
        library_ids: &[String],
    ) -> anyhow::Result<Vec<String>> {
        self.inner.active_item_ids_in_libraries(library_ids).await
    }

    async fn item_ids_in_libraries(
        &self,
        library_ids: &[String],
    ) -> anyhow::Result<Vec<String>> {
        self.inner.item_ids_in_libraries(library_ids).await
    }

    async fn ids_by_series(
        &self,
        table: Table,
        series_ids: &[String],
    ) -> anyhow::Result<Vec<String>> {
        self.inner.ids_by_series(table, series_ids).await
    }

    async fn existing_ids(&self, table: Table, ids: &[String]) -> anyhow::Result<Vec<String>> {
        self.inner.existing_ids(table, ids).await
    }

    async fn item_info_owner_ids(&self, owner_ids: &[String]) -> anyhow::Result<Vec<String>> {
        self.inner.item_info_owner_ids(owner_ids).await
    }

    async fn archived_series_ids(&self) -> anyhow::Result<Vec<String>> {
        self.inner.archived_series_ids().await
    }

    async fn archived_season_ids(&self) -> anyhow::Result<Vec<String>> {
        self.inner.archived_season_ids().await
    }

    async fn remove_orphaned_data(&self) -> anyhow::Result<OrphanReport> {
        self.inner.remove_orphaned_data().await
    }

    async fn delete_unparented_episodes(&self) -> anyhow::Result<u64> {
        self.inner.delete_unparented_episodes().await
    }

    async fn update_library_stats(&self) -> anyhow::Result<()> {
        self.inner.update_library_stats().await
    }

    async fn sync_playback_user_names(&self) -> anyhow::Result<u64> {
        self.inner.sync_playback_user_names().await
    }

    async fn item_migration_candidates(&self) -> anyhow::Result<Vec<ItemMigration>> {
        self.inner.item_migration_candidates().await
    }

    async fn episode_migration_candidates(&self) -> anyhow::Result<Vec<EpisodeMigration>> {
        self.inner.episode_migration_candidates().await
    }

    async fn apply_item_migrations(&self, migrations: &[ItemMigration]) -> anyhow::Result<u64> {
        self.inner.apply_item_migrations(migrations).await
    }

    async fn apply_episode_migrations(
        &self,
        migrations: &[EpisodeMigration],
    ) -> anyhow::Result<u64> {
        self.inner.apply_episode_migrations(migrations).await
    }

    async fn activity_bounds(&self) -> anyhow::Result<ActivityBounds> {
        self.inner.activity_bounds().await
    }

    async fn max_plugin_rowid(&self) -> anyhow::Result<Option<i64>> {
        self.inner.max_plugin_rowid().await
    }

    async fn fold_imported_plugin_rows(&self) -> anyhow::Result<u64> {
        self.inner.fold_imported_plugin_rows().await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub source: Arc<FakeMediaSource>,
    pub store: Arc<SqliteCatalogStore>,
    pub progress: Arc<RecordingSink>,
    pub engine: Arc<ReconciliationEngine>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(SyncSettings::default()).await
    }

    pub async fn with_settings(settings: SyncSettings) -> Self {
        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let store = Arc::new(SqliteCatalogStore::new(pool.pool().clone()));
        let source = Arc::new(FakeMediaSource::default());
        let progress = Arc::new(RecordingSink::default());
        let engine = Arc::new(ReconciliationEngine::new(
            Some(Arc::clone(&source) as Arc<dyn IMediaSource>),
            Arc::clone(&store) as Arc<dyn ICatalogStore>,
            Arc::clone(&store) as Arc<dyn ITaskLog>,
            Arc::clone(&progress) as Arc<dyn IProgressSink>,
            settings,
        ));
        Self {
            source,
            store,
            progress,
            engine,
        }
    }

    /// A second engine over the same store and source
    pub fn engine_with(&self, settings: SyncSettings) -> ReconciliationEngine {
        ReconciliationEngine::new(
            Some(Arc::clone(&self.source) as Arc<dyn IMediaSource>),
            Arc::clone(&self.store) as Arc<dyn ICatalogStore>,
            Arc::clone(&self.store) as Arc<dyn ITaskLog>,
            Arc::clone(&self.progress) as Arc<dyn IProgressSink>,
            settings,
        )
    }

    /// An engine writing through `store` instead of the plain SQLite store
    pub fn engine_over(&self, store: Arc<dyn ICatalogStore>) -> ReconciliationEngine {
        ReconciliationEngine::new(
            Some(Arc::clone(&self.source) as Arc<dyn IMediaSource>),
            store,
            Arc::clone(&self.store) as Arc<dyn ITaskLog>,
            Arc::clone(&self.progress) as Arc<dyn IProgressSink>,
            SyncSettings::default(),
        )
    }

    /// An engine with no media server configured
    pub fn unconfigured_engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            None,
            Arc::clone(&self.store) as Arc<dyn ICatalogStore>,
            Arc::clone(&self.store) as Arc<dyn ITaskLog>,
            Arc::clone(&self.progress) as Arc<dyn IProgressSink>,
            SyncSettings::default(),
        )
    }

    pub async fn latest_run(&self, task: TaskName) -> TaskRun {
        self.store
            .latest_run(task)
            .await
            .unwrap()
            .expect("a run was recorded")
    }

    pub async fn archived(&self, table: Table, id: &str) -> Option<bool> {
        self.store.archived_flag(table, id).await.unwrap()
    }

    /// Movies library `lib-movies` with m1 and m2, shows library
    /// `lib-shows` with one series, one season and two episodes
    pub fn seed_catalog(&self) {
        self.source.set_users(&[("u1", "alice")]);
        self.source
            .set_libraries(&[("lib-movies", "Movies"), ("lib-shows", "Shows")]);
        self.source.set_items(
            "lib-movies",
            vec![movie("m1", "Alpha"), movie("m2", "Beta")],
        );
        self.source.set_items(
            "lib-shows",
            vec![
                series("s1", "Show"),
                season("se1", "s1", "Season 1"),
                episode("e1", "Pilot", "s1", Some("se1")),
                episode("e2", "Second", "s1", Some("se1")),
            ],
        );
    }
}

pub fn messages(lines: &[LogLine]) -> Vec<&str> {
    lines.iter().map(|l| l.message.as_str()).collect()
}

// ============================================================================
// Remote record builders
// ============================================================================

fn media_source(owner_id: &str) -> RemoteMediaSource {
    RemoteMediaSource {
        id: Some(format!("ms-{owner_id}")),
        path: Some(format!("/media/{owner_id}.mkv")),
        name: Some(owner_id.to_string()),
        size: Some(1_000_000),
        bitrate: Some(8_000_000),
        media_streams: vec![json!({"Type": "Video", "Codec": "h264"})],
    }
}

pub fn movie(id: &str, name: &str) -> RemoteItem {
    RemoteItem {
        id: Some(id.into()),
        name: Some(name.into()),
        item_type: Some("Movie".into()),
        production_year: Some(2020),
        media_sources: vec![media_source(id)],
        ..Default::default()
    }
}

pub fn series(id: &str, name: &str) -> RemoteItem {
    RemoteItem {
        id: Some(id.into()),
        name: Some(name.into()),
        item_type: Some("Series".into()),
        ..Default::default()
    }
}

pub fn season(id: &str, series_id: &str, name: &str) -> RemoteItem {
    RemoteItem {
        id: Some(id.into()),
        name: Some(name.into()),
        item_type: Some("Season".into()),
        series_id: Some(series_id.into()),
        series_name: Some("Show".into()),
        index_number: Some(1),
        ..Default::default()
    }
}

pub fn episode(id: &str, name: &str, series_id: &str, season_id: Option<&str>) -> RemoteItem {
    RemoteItem {
        id: Some(id.into()),
        name: Some(name.into()),
        item_type: Some("Episode".into()),
        series_id: Some(series_id.into()),
        season_id: season_id.map(str::to_owned),
        series_name: Some("Show".into()),
        season_name: Some("Season 1".into()),
        index_number: Some(1),
        parent_index_number: Some(1),
        media_sources: vec![media_source(id)],
        ..Default::default()
    }
}
