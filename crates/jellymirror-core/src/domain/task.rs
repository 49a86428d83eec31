//! Task runs
//!
//! A [`TaskRun`] is the durable record of one full sync, partial sync or
//! plugin import. It doubles as the cross-process mutual-exclusion signal:
//! a `Running` row of a conflicting kind blocks the schedulers.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{errors::DomainError, newtypes::RunId};

/// Progress channel used when a start request is rejected
pub const TASK_ERROR_CHANNEL: &str = "TaskError";

/// Kind of task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskName {
    FullSync,
    PartialSync,
    PluginImport,
}

impl TaskName {
    /// Stable identifier stored in the task log
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::FullSync => "FullSync",
            TaskName::PartialSync => "PartialSync",
            TaskName::PluginImport => "PluginImport",
        }
    }

    /// Human-readable label used in progress messages
    pub fn label(&self) -> &'static str {
        match self {
            TaskName::FullSync => "Full Jellyfin Sync",
            TaskName::PartialSync => "Recently Added Sync",
            TaskName::PluginImport => "Playback Reporting Plugin Sync",
        }
    }

    /// Progress channel name for this task kind
    pub fn channel(&self) -> &'static str {
        match self {
            TaskName::FullSync => "FullSyncTask",
            TaskName::PartialSync => "PartialSyncTask",
            TaskName::PluginImport => "PlaybackSyncTask",
        }
    }

    /// Task kinds whose `Running` row blocks a run of this kind (itself included)
    pub fn conflicts(&self) -> &'static [TaskName] {
        match self {
            TaskName::FullSync | TaskName::PartialSync => {
                &[TaskName::FullSync, TaskName::PartialSync]
            }
            TaskName::PluginImport => &[TaskName::PluginImport],
        }
    }

    pub fn conflicts_with(&self, other: TaskName) -> bool {
        self.conflicts().contains(&other)
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FullSync" => Ok(TaskName::FullSync),
            "PartialSync" => Ok(TaskName::PartialSync),
            "PluginImport" => Ok(TaskName::PluginImport),
            other => Err(DomainError::UnknownTask(other.to_string())),
        }
    }
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    Manual,
    Scheduled,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "Manual",
            TriggerType::Scheduled => "Scheduled",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Manual" => Ok(TriggerType::Manual),
            "Scheduled" => Ok(TriggerType::Scheduled),
            other => Err(DomainError::UnknownTrigger(other.to_string())),
        }
    }
}

/// Result column of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Running,
    Success,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Running => "Running",
            TaskState::Success => "Success",
            TaskState::Failed => "Failed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(TaskState::Running),
            "Success" => Ok(TaskState::Success),
            "Failed" => Ok(TaskState::Failed),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// Severity of a line in a run's log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Progress,
    Warning,
    Error,
}

impl LogLevel {
    /// Same spelling as the serialized log
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Progress => "progress",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// One line of a run's durable log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Progress, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// Durable record of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRun {
    id: RunId,
    name: TaskName,
    trigger: TriggerType,
    result: TaskState,
    time_run: DateTime<Utc>,
    duration_ms: Option<i64>,
    logged_data: Vec<LogLine>,
}

impl TaskRun {
    /// Creates a new run in the `Running` state, started now
    pub fn start(id: RunId, name: TaskName, trigger: TriggerType) -> Self {
        Self {
            id,
            name,
            trigger,
            result: TaskState::Running,
            time_run: Utc::now(),
            duration_ms: None,
            logged_data: Vec::new(),
        }
    }

    /// Rebuilds a run from persisted columns
    pub fn restore(
        id: RunId,
        name: TaskName,
        trigger: TriggerType,
        result: TaskState,
        time_run: DateTime<Utc>,
        duration_ms: Option<i64>,
        logged_data: Vec<LogLine>,
    ) -> Self {
        Self {
            id,
            name,
            trigger,
            result,
            time_run,
            duration_ms,
            logged_data,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn name(&self) -> TaskName {
        self.name
    }

    pub fn trigger(&self) -> TriggerType {
        self.trigger
    }

    pub fn result(&self) -> TaskState {
        self.result
    }

    pub fn time_run(&self) -> DateTime<Utc> {
        self.time_run
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_ms
    }

    pub fn logged_data(&self) -> &[LogLine] {
        &self.logged_data
    }

    pub fn is_running(&self) -> bool {
        self.result.is_running()
    }

    /// Moves a running run to a terminal state
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the run is already terminal or
    /// the target state is `Running`.
    pub fn finish(
        &mut self,
        result: TaskState,
        logged_data: Vec<LogLine>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.is_running() || result.is_running() {
            return Err(DomainError::InvalidState {
                from: self.result.to_string(),
                to: result.to_string(),
            });
        }
        self.result = result;
        self.logged_data = logged_data;
        self.duration_ms = Some((finished_at - self.time_run).num_milliseconds().max(0));
        Ok(())
    }
}

/// Type of a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressKind {
    Start,
    Update,
    Success,
    Error,
}

/// Message published on a task's progress channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(kind: ProgressKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ProgressKind::Success | ProgressKind::Error)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn full_and_partial_sync_exclude_each_other() {
        assert!(TaskName::FullSync.conflicts_with(TaskName::PartialSync));
        assert!(TaskName::PartialSync.conflicts_with(TaskName::FullSync));
        assert!(TaskName::FullSync.conflicts_with(TaskName::FullSync));
        assert!(!TaskName::FullSync.conflicts_with(TaskName::PluginImport));
        assert!(!TaskName::PluginImport.conflicts_with(TaskName::PartialSync));
        assert!(TaskName::PluginImport.conflicts_with(TaskName::PluginImport));
    }

    #[test]
    fn channels_match_task_kinds() {
        assert_eq!(TaskName::FullSync.channel(), "FullSyncTask");
        assert_eq!(TaskName::PartialSync.channel(), "PartialSyncTask");
        assert_eq!(TaskName::PluginImport.channel(), "PlaybackSyncTask");
    }

    #[test]
    fn names_states_and_triggers_parse_back() {
        for name in [
            TaskName::FullSync,
            TaskName::PartialSync,
            TaskName::PluginImport,
        ] {
            assert_eq!(name.as_str().parse::<TaskName>().unwrap(), name);
        }
        for state in [TaskState::Running, TaskState::Success, TaskState::Failed] {
            assert_eq!(state.as_str().parse::<TaskState>().unwrap(), state);
        }
        assert_eq!(
            "Scheduled".parse::<TriggerType>().unwrap(),
            TriggerType::Scheduled
        );
        assert!("Hourly".parse::<TriggerType>().is_err());
        assert!("Backup".parse::<TaskName>().is_err());
    }

    #[test]
    fn finish_records_duration_and_lines() {
        let mut run = TaskRun::start(RunId::new(), TaskName::FullSync, TriggerType::Manual);
        assert!(run.is_running());

        let end = run.time_run() + Duration::milliseconds(1500);
        run.finish(TaskState::Success, vec![LogLine::info("done")], end)
            .unwrap();

        assert_eq!(run.result(), TaskState::Success);
        assert_eq!(run.duration_ms(), Some(1500));
        assert_eq!(run.logged_data().len(), 1);
    }

    #[test]
    fn finish_twice_is_rejected() {
        let mut run = TaskRun::start(RunId::new(), TaskName::PartialSync, TriggerType::Scheduled);
        let now = Utc::now();
        run.finish(TaskState::Failed, vec![], now).unwrap();

        let err = run.finish(TaskState::Success, vec![], now).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
    }

    #[test]
    fn progress_event_serializes_type_field() {
        let event = ProgressEvent::new(ProgressKind::Update, "Syncing User Data");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Update");
        assert_eq!(json["message"], "Syncing User Data");
        assert!(!event.is_terminal());
        assert!(ProgressEvent::new(ProgressKind::Error, "x").is_terminal());
    }

    #[test]
    fn log_line_levels_serialize_snake_case() {
        let json = serde_json::to_string(&LogLine::warning("careful")).unwrap();
        assert_eq!(json, r#"{"level":"warning","message":"careful"}"#);
        assert_eq!(LogLevel::Warning.as_str(), "warning");
    }
}
