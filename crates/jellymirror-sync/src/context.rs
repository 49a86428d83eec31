//! Per-run state
//!
//! A [`RunContext`] is created when a run opens and handed by `&mut` to
//! every phase. It owns the run's log lines, counters, the ids fetched
//! from the server so far and the libraries whose children must not be
//! archived.

use std::collections::{BTreeMap, HashSet};

use jellymirror_core::domain::{LogLine, RunId, TaskName, TriggerType};

use crate::resolver::Counter;

/// Entity kinds reported in the per-run counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Items,
    Seasons,
    Episodes,
    ItemInfo,
    EpisodeInfo,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Items => "Items",
            EntityKind::Seasons => "Seasons",
            EntityKind::Episodes => "Episodes",
            EntityKind::ItemInfo => "Item Info",
            EntityKind::EpisodeInfo => "Episode Info",
        }
    }
}

/// Ids returned by the server during this run
#[derive(Debug, Default)]
pub struct FetchedIds {
    pub items: HashSet<String>,
    pub seasons: HashSet<String>,
    pub episodes: HashSet<String>,
}

pub struct RunContext {
    run_id: RunId,
    task: TaskName,
    trigger: TriggerType,
    phase: &'static str,
    lines: Vec<LogLine>,
    counters: BTreeMap<EntityKind, Counter>,
    pub fetched: FetchedIds,
    /// Libraries whose children are left untouched by the archive pass
    pub protected_libraries: HashSet<String>,
}

impl RunContext {
    pub fn new(run_id: RunId, task: TaskName, trigger: TriggerType) -> Self {
        Self {
            run_id,
            task,
            trigger,
            phase: "start",
            lines: Vec::new(),
            counters: BTreeMap::new(),
            fetched: FetchedIds::default(),
            protected_libraries: HashSet::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn task(&self) -> TaskName {
        self.task
    }

    pub fn trigger(&self) -> TriggerType {
        self.trigger
    }

    pub fn is_full_sync(&self) -> bool {
        self.task == TaskName::FullSync
    }

    /// Names the phase reported when a typed error ends the run
    pub fn enter_phase(&mut self, phase: &'static str) {
        tracing::debug!(run_id = %self.run_id, task = %self.task, phase, "Entering phase");
        self.phase = phase;
    }

    pub fn phase(&self) -> &'static str {
        self.phase
    }

    // ========================================================================
    // Run log
    // ========================================================================

    pub fn info(&mut self, message: impl Into<String>) {
        self.lines.push(LogLine::info(message));
    }

    pub fn progress(&mut self, message: impl Into<String>) {
        self.lines.push(LogLine::progress(message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let line = LogLine::warning(message);
        tracing::warn!(run_id = %self.run_id, task = %self.task, "{}", line.message);
        self.lines.push(line);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.lines.push(LogLine::error(message));
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn take_lines(&mut self) -> Vec<LogLine> {
        std::mem::take(&mut self.lines)
    }

    // ========================================================================
    // Counters
    // ========================================================================

    pub fn count(&mut self, kind: EntityKind, counter: Counter) {
        *self.counters.entry(kind).or_default() += counter;
    }

    pub fn counter(&self, kind: EntityKind) -> Counter {
        self.counters.get(&kind).copied().unwrap_or_default()
    }

    pub fn counters(&self) -> &BTreeMap<EntityKind, Counter> {
        &self.counters
    }

    /// Appends one "N X inserted. M X updated" line per entity kind
    pub fn log_counters(&mut self) {
        let summary: Vec<String> = [
            EntityKind::Items,
            EntityKind::Seasons,
            EntityKind::Episodes,
            EntityKind::ItemInfo,
            EntityKind::EpisodeInfo,
        ]
        .iter()
        .map(|kind| {
            let c = self.counter(*kind);
            format!(
                "{} {label} inserted. {} {label} updated",
                c.inserted,
                c.updated,
                label = kind.label()
            )
        })
        .collect();
        for line in summary {
            self.info(line);
        }
    }
}
