//! Configuration module for Jellymirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Jellymirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub tasks: TasksConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Connection to the Jellyfin server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL, e.g. `http://jellyfin.local:8096`. `None` until configured.
    pub url: Option<String>,
    /// API key created in the server dashboard.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Catalog sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records requested per page when listing a library.
    pub page_size: u32,
    /// Library ids that are never synced.
    pub excluded_libraries: Vec<String>,
    /// Partial sync only fetches records saved within this many minutes.
    pub recent_window_minutes: u32,
}

/// Scheduling of one background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSchedule {
    /// Minimum minutes between two runs.
    pub interval_minutes: u32,
    /// Seconds between scheduler checks.
    pub poll_seconds: u32,
}

/// Background task schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub full_sync: TaskSchedule,
    pub partial_sync: TaskSchedule,
}

/// Local mirror database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/jellymirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("jellymirror")
            .join("config.yaml")
    }

    /// Server URL and API key, when both are set and non-empty.
    pub fn server_credentials(&self) -> Option<(&str, &str)> {
        let url = self.server.url.as_deref().filter(|s| !s.trim().is_empty())?;
        let key = self
            .server
            .api_key
            .as_deref()
            .filter(|s| !s.trim().is_empty())?;
        Some((url, key))
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            excluded_libraries: Vec::new(),
            recent_window_minutes: 1440,
        }
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            full_sync: TaskSchedule {
                interval_minutes: 1440,
                poll_seconds: 10,
            },
            partial_sync: TaskSchedule {
                interval_minutes: 60,
                poll_seconds: 11,
            },
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("jellymirror")
                .join("jellymirror.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Missing server
    /// credentials are not a validation error: the engine reports them per
    /// run instead.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- server ---
        if let Some(url) = self.server.url.as_deref() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError {
                    field: "server.url".into(),
                    message: format!("must start with http:// or https://, got '{url}'"),
                });
            }
        }
        positive(&mut errors, "server.timeout_secs", self.server.timeout_secs);

        // --- sync ---
        positive(&mut errors, "sync.page_size", u64::from(self.sync.page_size));
        positive(
            &mut errors,
            "sync.recent_window_minutes",
            u64::from(self.sync.recent_window_minutes),
        );

        // --- tasks ---
        for (name, schedule) in [
            ("full_sync", &self.tasks.full_sync),
            ("partial_sync", &self.tasks.partial_sync),
        ] {
            positive(
                &mut errors,
                &format!("tasks.{name}.interval_minutes"),
                u64::from(schedule.interval_minutes),
            );
            positive(
                &mut errors,
                &format!("tasks.{name}.poll_seconds"),
                u64::from(schedule.poll_seconds),
            );
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use jellymirror_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .server_url("http://jellyfin.local:8096")
///     .server_api_key("0123456789abcdef")
///     .sync_page_size(100)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- server ---

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server.url = Some(url.into());
        self
    }

    pub fn server_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.server.api_key = Some(key.into());
        self
    }

    pub fn server_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.server.timeout_secs = seconds;
        self
    }

    // --- sync ---

    pub fn sync_page_size(mut self, size: u32) -> Self {
        self.config.sync.page_size = size;
        self
    }

    pub fn sync_excluded_library(mut self, library_id: impl Into<String>) -> Self {
        self.config.sync.excluded_libraries.push(library_id.into());
        self
    }

    pub fn sync_recent_window_minutes(mut self, minutes: u32) -> Self {
        self.config.sync.recent_window_minutes = minutes;
        self
    }

    // --- tasks ---

    pub fn full_sync_schedule(mut self, interval_minutes: u32, poll_seconds: u32) -> Self {
        self.config.tasks.full_sync = TaskSchedule {
            interval_minutes,
            poll_seconds,
        };
        self
    }

    pub fn partial_sync_schedule(mut self, interval_minutes: u32, poll_seconds: u32) -> Self {
        self.config.tasks.partial_sync = TaskSchedule {
            interval_minutes,
            poll_seconds,
        };
        self
    }

    // --- database ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
