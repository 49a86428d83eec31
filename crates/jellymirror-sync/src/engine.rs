//! Reconciliation engine
//!
//! The [`ReconciliationEngine`] runs one task kind end to end against the
//! media server and the local catalog store.
//!
//! ## Full sync
//!
//! 1. **Users**: upsert, delete users gone from the server, repair
//!    activity user names
//! 2. **Library folders**: upsert, archive libraries that vanished or are
//!    excluded
//! 3. **Media**: page through every non-excluded library, writing items,
//!    seasons, episodes and media-source info page by page
//! 4. **Archive**: active rows not fetched during this run are archived
//! 5. **Reconcile**: orphan cleanup and archive cascade
//! 6. **Migrate**: re-point playback history at re-added items
//! 7. **Statistics**: refresh per-library counters
//!
//! A partial sync runs steps 1, 3 and 7 over records changed within the
//! recency window and only ever inserts unseen rows.
//!
//! ## Failure handling
//!
//! Any error aborts the remaining phases. The run row is closed as
//! `Failed` with a line naming where the error was raised, and a terminal
//! `Error` progress event is published. Nothing is retried here; transport
//! retries belong to the media source adapter.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use jellymirror_audit::TaskLogger;
use jellymirror_core::config::Config;
use jellymirror_core::domain::{
    Episode, ImportedPluginRow, Library, LibraryItem, OwnerKind, ProgressEvent, ProgressKind,
    Season, TaskName, TaskRun, TaskState, TriggerType, User, TASK_ERROR_CHANNEL,
};
use jellymirror_core::mapping::{
    map_episode, map_item, map_library, map_media_sources, map_plugin_row, map_season, map_user,
};
use jellymirror_core::ports::{
    Column, FieldValue, ICatalogStore, IMediaSource, IProgressSink, ITaskLog, ItemQuery,
    RemoteItem, RowBatch, Table,
};

use crate::context::{EntityKind, RunContext};
use crate::plugin::{build_import_query, has_playback_reporting};
use crate::resolver::{archive_set, plan_batch, unseen, Counter, PageSplit};
use crate::{migrator, reconciler, SyncError};

// ============================================================================
// Settings and results
// ============================================================================

/// Sync tunables taken from the `sync` section of the configuration
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub page_size: u32,
    pub excluded_libraries: HashSet<String>,
    /// How far back a partial sync looks for changed records
    pub recent_window: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.sync.page_size.max(1),
            excluded_libraries: config.sync.excluded_libraries.iter().cloned().collect(),
            recent_window: Duration::minutes(i64::from(config.sync.recent_window_minutes)),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: TaskRun,
    pub counters: BTreeMap<EntityKind, Counter>,
}

// ============================================================================
// ReconciliationEngine
// ============================================================================

pub struct ReconciliationEngine {
    /// `None` when no server is configured; every run then fails with
    /// `ConfigurationMissing`
    source: Option<Arc<dyn IMediaSource>>,
    store: Arc<dyn ICatalogStore>,
    tasks: TaskLogger,
    progress: Arc<dyn IProgressSink>,
    settings: SyncSettings,
    /// Held for the whole run; at most one run per process
    run_guard: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(
        source: Option<Arc<dyn IMediaSource>>,
        store: Arc<dyn ICatalogStore>,
        task_log: Arc<dyn ITaskLog>,
        progress: Arc<dyn IProgressSink>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            store,
            tasks: TaskLogger::new(task_log),
            progress,
            settings,
            run_guard: Mutex::new(()),
        }
    }

    pub fn task_logger(&self) -> &TaskLogger {
        &self.tasks
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Whether a media server is wired in
    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    /// Whether a run is in flight in this process
    pub fn is_busy(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    #[instrument(skip(self))]
    pub async fn full_sync(&self, trigger: TriggerType) -> Result<RunReport, SyncError> {
        self.run_task(TaskName::FullSync, trigger).await
    }

    #[instrument(skip(self))]
    pub async fn partial_sync(&self, trigger: TriggerType) -> Result<RunReport, SyncError> {
        self.run_task(TaskName::PartialSync, trigger).await
    }

    #[instrument(skip(self))]
    pub async fn import_plugin_data(&self, trigger: TriggerType) -> Result<RunReport, SyncError> {
        self.run_task(TaskName::PluginImport, trigger).await
    }

    /// Runs `task` unless a conflicting run is in progress.
    ///
    /// A conflict is reported before any row is written.
    pub async fn run_task(
        &self,
        task: TaskName,
        trigger: TriggerType,
    ) -> Result<RunReport, SyncError> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            return Err(self.reject(task, "in-process run"));
        };
        if let Some(running) = self.tasks.conflicting_run(task).await? {
            return Err(self.reject(task, running.name().as_str()));
        }

        let run = self.tasks.open_run(task, trigger).await?;
        let mut ctx = RunContext::new(run.id(), task, trigger);
        info!(run_id = %run.id(), task = %task, trigger = %trigger, "Task run started");
        self.publish(task, ProgressKind::Start, started_message(task, trigger));

        let outcome = match task {
            TaskName::FullSync | TaskName::PartialSync => self.run_sync(&mut ctx).await,
            TaskName::PluginImport => self.run_plugin_import(&mut ctx).await,
        };
        self.finish(run, ctx, outcome).await
    }

    fn reject(&self, task: TaskName, running: &str) -> SyncError {
        warn!(task = %task, running, "Rejected task start: a conflicting run is in progress");
        self.progress.send(
            TASK_ERROR_CHANNEL,
            ProgressEvent::new(ProgressKind::Error, "Error: Sync is already running"),
        );
        SyncError::ConcurrentRunConflict { requested: task }
    }

    async fn finish(
        &self,
        mut run: TaskRun,
        mut ctx: RunContext,
        outcome: Result<(), SyncError>,
    ) -> Result<RunReport, SyncError> {
        let task = ctx.task();
        let trigger = ctx.trigger();

        match outcome {
            Ok(()) => {
                self.tasks
                    .close_run(&mut run, TaskState::Success, ctx.take_lines())
                    .await;
                info!(
                    run_id = %run.id(),
                    task = %task,
                    duration_ms = run.duration_ms().unwrap_or_default(),
                    "Task run completed"
                );
                self.publish(task, ProgressKind::Success, completed_message(task, trigger));
                Ok(RunReport {
                    run,
                    counters: ctx.counters().clone(),
                })
            }
            Err(err) => {
                let line = match &err {
                    SyncError::Unclassified { .. } => err.to_string(),
                    other => format!("{}: Error: {}", ctx.phase(), other),
                };
                ctx.error(line);
                self.tasks
                    .close_run(&mut run, TaskState::Failed, ctx.take_lines())
                    .await;
                error!(run_id = %run.id(), task = %task, error = %err, "Task run failed");

                // An empty server is not a crash: the run is failed but the
                // channel reports completion.
                if matches!(err, SyncError::EmptyCatalog) {
                    self.publish(task, ProgressKind::Success, completed_message(task, trigger));
                } else {
                    self.publish(task, ProgressKind::Error, halted_message(task, trigger));
                }
                Err(err)
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn source(&self) -> Result<&dyn IMediaSource, SyncError> {
        self.source
            .as_deref()
            .ok_or(SyncError::ConfigurationMissing)
    }

    fn publish(&self, task: TaskName, kind: ProgressKind, message: impl Into<String>) {
        self.progress
            .send(task.channel(), ProgressEvent::new(kind, message));
    }

    fn update(&self, ctx: &RunContext, message: impl Into<String>) {
        self.publish(ctx.task(), ProgressKind::Update, message);
    }

    async fn upsert(&self, batch: RowBatch) -> Result<(), SyncError> {
        if batch.is_empty() {
            return Ok(());
        }
        let table = batch.table();
        SyncError::check_bulk(self.store.upsert_many(batch).await, table, "upsert")
    }

    async fn archive(&self, table: Table, ids: &[String]) -> Result<(), SyncError> {
        if ids.is_empty() {
            return Ok(());
        }
        let outcome = self
            .store
            .set_field(
                table,
                ids,
                Column::Archived,
                FieldValue::Bool(true),
                table.id_column(),
            )
            .await;
        SyncError::check_bulk(outcome, table, "archive")
    }

    // ========================================================================
    // Full and partial sync
    // ========================================================================

    async fn run_sync(&self, ctx: &mut RunContext) -> Result<(), SyncError> {
        let source = self.source()?;

        self.sync_users(source, ctx).await?;
        let libraries = self.sync_library_folders(source, ctx).await?;
        self.sync_media(source, ctx, &libraries).await?;

        if ctx.is_full_sync() {
            self.archive_absent(ctx).await?;
        }
        ctx.info("Media Sync Complete");

        if ctx.is_full_sync() {
            ctx.enter_phase("reconcile");
            ctx.progress("Syncing... 4/4");
            self.update(ctx, "Cleaning up FileInfo/Episode/Season Records (4/4)");
            reconciler::reconcile(self.store.as_ref(), ctx).await?;

            ctx.enter_phase("migrate_activity");
            self.update(ctx, "Migrating Archived Activity to New Items");
            migrator::migrate_activity(self.store.as_ref(), ctx).await?;
        }

        ctx.enter_phase("update_library_stats");
        ctx.info("Updating Library Stats");
        self.store.update_library_stats().await?;
        ctx.info("Library Stats Updated.");
        Ok(())
    }

    async fn sync_users(
        &self,
        source: &dyn IMediaSource,
        ctx: &mut RunContext,
    ) -> Result<(), SyncError> {
        ctx.enter_phase("sync_users");
        self.update(ctx, "Syncing User Data");
        ctx.progress("Syncing... 1/4");
        ctx.info("Beginning User Sync");

        let users: Vec<User> = source.list_users().await?.iter().filter_map(map_user).collect();
        let fetched: HashSet<String> = users.iter().map(|u| u.id.clone()).collect();
        let existing = self.store.all_ids(Table::Users).await?;

        self.upsert(RowBatch::Users(users)).await?;

        let gone: Vec<String> = existing
            .into_iter()
            .filter(|id| !fetched.contains(id))
            .collect();
        if !gone.is_empty() {
            SyncError::check_bulk(
                self.store.delete_many(Table::Users, &gone).await,
                Table::Users,
                "delete",
            )?;
            debug!(run_id = %ctx.run_id(), count = gone.len(), "Removed users no longer on the server");
        }

        let renamed = self.store.sync_playback_user_names().await?;
        if renamed > 0 {
            debug!(run_id = %ctx.run_id(), renamed, "Repaired activity user names");
        }
        ctx.info("User Sync Complete");
        Ok(())
    }

    /// Returns the non-excluded libraries whose items are synced next
    async fn sync_library_folders(
        &self,
        source: &dyn IMediaSource,
        ctx: &mut RunContext,
    ) -> Result<Vec<Library>, SyncError> {
        ctx.enter_phase("sync_library_folders");
        self.update(ctx, "Syncing Library Folders");
        ctx.progress("Syncing... 2/4");
        ctx.info("Beginning Library Sync");

        let remote: Vec<Library> = source
            .list_libraries()
            .await?
            .iter()
            .filter_map(map_library)
            .collect();
        if remote.is_empty() {
            return Err(SyncError::EmptyCatalog);
        }

        let (excluded, libraries): (Vec<Library>, Vec<Library>) = remote
            .into_iter()
            .partition(|l| self.settings.excluded_libraries.contains(&l.id));
        let excluded: HashSet<String> = excluded.into_iter().map(|l| l.id).collect();

        if ctx.is_full_sync() {
            self.upsert(RowBatch::Libraries(libraries.clone())).await?;

            let synced: HashSet<String> = libraries.iter().map(|l| l.id.clone()).collect();
            let to_archive = archive_set(
                self.store.active_ids(Table::Libraries).await?,
                &synced,
                &HashSet::new(),
            );
            if !to_archive.is_empty() {
                self.update(ctx, "Archiving old Library Data");
                // Items of excluded libraries stay as they are
                let vanished: Vec<String> = to_archive
                    .iter()
                    .filter(|id| !excluded.contains(*id))
                    .cloned()
                    .collect();
                if !vanished.is_empty() {
                    let items = self.store.active_item_ids_in_libraries(&vanished).await?;
                    self.archive(Table::Items, &items).await?;
                }
                self.archive(Table::Libraries, &to_archive).await?;
                ctx.warning(format!("{} Libraries Archived.", to_archive.len()));
            }
            ctx.protected_libraries.extend(excluded);
        } else {
            let known: HashSet<String> = self
                .store
                .all_ids(Table::Libraries)
                .await?
                .into_iter()
                .collect();
            let fresh = unseen(libraries.clone(), &known, |l| l.id.as_str());
            if !fresh.is_empty() {
                ctx.info(format!("{} Libraries added.", fresh.len()));
                self.upsert(RowBatch::Libraries(fresh)).await?;
            }
        }

        ctx.info("Library Sync Complete");
        Ok(libraries)
    }

    async fn sync_media(
        &self,
        source: &dyn IMediaSource,
        ctx: &mut RunContext,
        libraries: &[Library],
    ) -> Result<(), SyncError> {
        ctx.enter_phase("sync_media");
        ctx.progress("Syncing... 3/4");
        ctx.info("Beginning Media Sync");

        let mut known_items: HashSet<String> =
            self.store.all_ids(Table::Items).await?.into_iter().collect();
        let changed_since =
            (!ctx.is_full_sync()).then(|| Utc::now() - self.settings.recent_window);

        for (index, library) in libraries.iter().enumerate() {
            self.update(
                ctx,
                format!(
                    "Syncing Library : {} ({}/{})",
                    library.name,
                    index + 1,
                    libraries.len()
                ),
            );

            let mut query = ItemQuery::first_page(&library.id, self.settings.page_size);
            if let Some(since) = changed_since {
                query = query.changed_since(since);
            }

            let mut fetched = 0usize;
            loop {
                let page = source.list_items(&query).await?;
                if page.is_empty() {
                    if query.is_first_page() && ctx.is_full_sync() {
                        ctx.protected_libraries.insert(library.id.clone());
                        ctx.warning(format!("No Items found for Library : {}", library.name));
                    }
                    break;
                }
                fetched += page.len();
                self.sync_page(ctx, &library.id, &page, &mut known_items)
                    .await?;
                query = query.next_page();
            }

            debug!(
                run_id = %ctx.run_id(),
                library = %library.name,
                records = fetched,
                "Library fetched"
            );
            self.update(ctx, format!("Data Fetched for Library : {}", library.name));
        }

        ctx.log_counters();
        Ok(())
    }

    /// Writes one fetched page: containers, seasons, episodes, media info
    async fn sync_page(
        &self,
        ctx: &mut RunContext,
        library_id: &str,
        page: &[RemoteItem],
        known_items: &mut HashSet<String>,
    ) -> Result<(), SyncError> {
        let full = ctx.is_full_sync();
        let split = PageSplit::from_page(page);

        let items: Vec<LibraryItem> = split
            .containers
            .iter()
            .filter_map(|r| map_item(r, library_id))
            .collect();
        if !items.is_empty() {
            let plan = plan_batch(items, known_items, full, |i| i.id.as_str());
            self.upsert(RowBatch::Items(plan.rows)).await?;
            ctx.count(EntityKind::Items, plan.counter);
            ctx.fetched.items.extend(plan.fetched.iter().cloned());
            known_items.extend(plan.fetched);
        }

        let seasons: Vec<Season> = split.seasons.iter().filter_map(|r| map_season(r)).collect();
        if !seasons.is_empty() {
            let existing = self
                .existing_for_page(
                    full,
                    Table::Seasons,
                    seasons.iter().map(|s| (s.id.as_str(), s.series_id.as_str())),
                )
                .await?;
            let plan = plan_batch(seasons, &existing, full, |s| s.id.as_str());
            self.upsert(RowBatch::Seasons(plan.rows)).await?;
            ctx.count(EntityKind::Seasons, plan.counter);
            ctx.fetched.seasons.extend(plan.fetched);
        }

        let episodes: Vec<Episode> = split
            .episodes
            .iter()
            .filter_map(|r| map_episode(r))
            .collect();
        if !episodes.is_empty() {
            let existing = self
                .existing_for_page(
                    full,
                    Table::Episodes,
                    episodes
                        .iter()
                        .map(|e| (e.episode_id.as_str(), e.series_id.as_str())),
                )
                .await?;
            let plan = plan_batch(episodes, &existing, full, |e| e.episode_id.as_str());
            self.upsert(RowBatch::Episodes(plan.rows)).await?;
            ctx.count(EntityKind::Episodes, plan.counter);
            ctx.fetched.episodes.extend(plan.fetched);
        }

        self.sync_item_info(ctx, &split).await
    }

    /// Rows of the page that already exist, in one batched lookup
    ///
    /// Full sync only needs the "updated" approximation, so it looks up by
    /// the page's series. Partial sync must never rewrite an existing row,
    /// so it looks up by the rows' own ids: a season or episode listed
    /// under a different series than the mirrored one is still known.
    async fn existing_for_page<'a>(
        &self,
        full: bool,
        table: Table,
        rows: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> Result<HashSet<String>, SyncError> {
        let (ids, series): (Vec<&str>, Vec<&str>) = rows.unzip();
        let mut keys: Vec<String> = if full { series } else { ids }
            .into_iter()
            .map(str::to_owned)
            .collect();
        keys.sort();
        keys.dedup();

        let found = if full {
            self.store.ids_by_series(table, &keys).await?
        } else {
            self.store.existing_ids(table, &keys).await?
        };
        Ok(found.into_iter().collect())
    }

    /// Full sync rewrites the media info of every owner in the page; partial
    /// sync only writes owners that have none yet.
    async fn sync_item_info(
        &self,
        ctx: &mut RunContext,
        split: &PageSplit<'_>,
    ) -> Result<(), SyncError> {
        let owners: Vec<(&RemoteItem, OwnerKind)> = split
            .containers
            .iter()
            .filter(|r| r.item_type.as_deref() != Some("Series"))
            .map(|r| (*r, OwnerKind::Item))
            .chain(split.episodes.iter().map(|r| (*r, OwnerKind::Episode)))
            .filter(|(r, _)| r.id.as_deref().is_some_and(|id| !id.is_empty()))
            .collect();
        if owners.is_empty() {
            return Ok(());
        }

        let owner_ids: Vec<String> = owners
            .iter()
            .filter_map(|(r, _)| r.id.clone())
            .collect();
        let recorded: HashSet<String> = self
            .store
            .item_info_owner_ids(&owner_ids)
            .await?
            .into_iter()
            .collect();

        let mut rows = Vec::new();
        for (record, kind) in owners {
            let has_rows = record
                .id
                .as_deref()
                .is_some_and(|id| recorded.contains(id));
            if has_rows && !ctx.is_full_sync() {
                continue;
            }
            let infos = map_media_sources(record, kind);
            let written = infos.len() as u64;
            let counter = if has_rows {
                Counter::new(0, written)
            } else {
                Counter::new(written, 0)
            };
            let entity = match kind {
                OwnerKind::Item => EntityKind::ItemInfo,
                OwnerKind::Episode => EntityKind::EpisodeInfo,
            };
            ctx.count(entity, counter);
            rows.extend(infos);
        }

        self.upsert(RowBatch::ItemInfo(rows)).await
    }

    /// Archives active rows that no page of this run returned
    async fn archive_absent(&self, ctx: &mut RunContext) -> Result<(), SyncError> {
        ctx.enter_phase("archive_absent");

        let (protected_items, protected_seasons, protected_episodes) =
            if ctx.protected_libraries.is_empty() {
                (HashSet::new(), HashSet::new(), HashSet::new())
            } else {
                let libraries: Vec<String> = ctx.protected_libraries.iter().cloned().collect();
                let items = self.store.item_ids_in_libraries(&libraries).await?;
                let seasons = self.store.ids_by_series(Table::Seasons, &items).await?;
                let episodes = self.store.ids_by_series(Table::Episodes, &items).await?;
                (
                    items.into_iter().collect::<HashSet<_>>(),
                    seasons.into_iter().collect::<HashSet<_>>(),
                    episodes.into_iter().collect::<HashSet<_>>(),
                )
            };

        let items = archive_set(
            self.store.active_ids(Table::Items).await?,
            &ctx.fetched.items,
            &protected_items,
        );
        self.archive(Table::Items, &items).await?;
        if !items.is_empty() {
            ctx.warning(format!("{} Library Items Archived.", items.len()));
        }

        let seasons = archive_set(
            self.store.active_ids(Table::Seasons).await?,
            &ctx.fetched.seasons,
            &protected_seasons,
        );
        self.archive(Table::Seasons, &seasons).await?;
        if !seasons.is_empty() {
            ctx.warning(format!("{} Seasons Archived.", seasons.len()));
        }

        let episodes = archive_set(
            self.store.active_ids(Table::Episodes).await?,
            &ctx.fetched.episodes,
            &protected_episodes,
        );
        self.archive(Table::Episodes, &episodes).await?;
        if !episodes.is_empty() {
            ctx.warning(format!("{} Episodes Archived.", episodes.len()));
        }
        Ok(())
    }

    // ========================================================================
    // Plugin import
    // ========================================================================

    async fn run_plugin_import(&self, ctx: &mut RunContext) -> Result<(), SyncError> {
        let source = self.source()?;
        ctx.enter_phase("import_plugin_data");
        ctx.progress("Syncing...");

        let plugins = source.list_installed_plugins().await?;
        if has_playback_reporting(&plugins) {
            ctx.info("Determining query constraints.");
            let bounds = self.store.activity_bounds().await?;
            let max_rowid = self.store.max_plugin_rowid().await?;
            let query = build_import_query(bounds, max_rowid);
            debug!(run_id = %ctx.run_id(), %query, "Plugin import query built");

            ctx.info("Query built. Executing.");
            let result = source.run_plugin_query(&query).await?;
            let rows: Vec<ImportedPluginRow> = result
                .results
                .iter()
                .filter_map(|row| map_plugin_row(&result.columns, row))
                .collect();

            if !rows.is_empty() {
                let count = rows.len();
                ctx.info(format!("Inserting {count} Rows."));
                self.upsert(RowBatch::PluginRows(rows)).await?;
                ctx.info(format!("{count} Rows have been inserted."));
                ctx.info("Running process to format data to be inserted into the Activity Table");
            }
            ctx.info("Process complete. Data has been imported.");
        } else {
            ctx.info("Playback Reporting Plugin not detected. No new data to insert.");
        }

        ctx.enter_phase("fold_plugin_rows");
        let folded = self.store.fold_imported_plugin_rows().await?;
        info!(run_id = %ctx.run_id(), folded, "Plugin rows folded into playback activity");
        ctx.info("Any imported data has been processed.");
        ctx.progress("Playback Reporting Plugin Sync Complete");
        Ok(())
    }
}

// ============================================================================
// Progress messages
// ============================================================================

fn started_message(task: TaskName, trigger: TriggerType) -> String {
    match task {
        TaskName::PluginImport => "Playback Plugin Sync Started".to_string(),
        _ => format!("{trigger} {} Started", task.label()),
    }
}

fn completed_message(task: TaskName, trigger: TriggerType) -> String {
    match task {
        TaskName::PluginImport => "Playback Plugin Sync Completed".to_string(),
        _ => format!("{trigger} Sync Completed"),
    }
}

fn halted_message(task: TaskName, trigger: TriggerType) -> String {
    match task {
        TaskName::PluginImport => "Playback Plugin Sync Halted with Errors".to_string(),
        _ => format!("{trigger} Sync Halted with Errors"),
    }
}
