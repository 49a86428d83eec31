//! Rendering of runs, progress and library statistics
//!
//! Both formatters render the same domain values. Human output is a set
//! of aligned lines on stdout; JSON output puts one document per command
//! on stdout and streams progress as compact JSON lines on stderr, so the
//! final document stays parseable.

use jellymirror_audit::ProgressMessage;
use jellymirror_core::domain::{LibraryStats, TaskRun, TaskState};
use jellymirror_sync::RunReport;
use serde_json::{json, Value};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Renders command results in one output format
pub trait OutputFormatter {
    /// Status line shown before a long operation starts
    fn notice(&self, message: &str);
    fn progress(&self, message: &ProgressMessage);
    /// A finished (or failed) run with its log and, on success, counters
    fn run(&self, run: &TaskRun, report: Option<&RunReport>);
    fn history(&self, runs: &[TaskRun], limit: u32);
    fn stats(&self, stats: &[LibraryStats]);
    fn error(&self, message: &str);
}

pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn notice(&self, message: &str) {
        println!("{message}");
    }

    fn progress(&self, message: &ProgressMessage) {
        println!("{}", progress_line(message));
    }

    fn run(&self, run: &TaskRun, report: Option<&RunReport>) {
        for line in run_lines(run, report) {
            println!("{line}");
        }
    }

    fn history(&self, runs: &[TaskRun], limit: u32) {
        for line in history_lines(runs, limit) {
            println!("{line}");
        }
    }

    fn stats(&self, stats: &[LibraryStats]) {
        for line in stats_lines(stats) {
            println!("{line}");
        }
    }

    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
}

/// Structured payloads reach stdout; progress and errors go to stderr
pub struct JsonFormatter;

impl JsonFormatter {
    fn document(value: &Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

impl OutputFormatter for JsonFormatter {
    fn notice(&self, message: &str) {
        eprintln!("{}", json!({"notice": message}));
    }

    fn progress(&self, message: &ProgressMessage) {
        match serde_json::to_string(message) {
            Ok(line) => eprintln!("{line}"),
            Err(e) => tracing::debug!(error = %e, "Failed to encode progress event"),
        }
    }

    fn run(&self, run: &TaskRun, report: Option<&RunReport>) {
        Self::document(&run_json(run, report));
    }

    fn history(&self, runs: &[TaskRun], limit: u32) {
        let runs_json: Vec<Value> = runs.iter().map(|run| run_json(run, None)).collect();
        Self::document(&json!({
            "limit": limit,
            "count": runs.len(),
            "runs": runs_json,
        }));
    }

    fn stats(&self, stats: &[LibraryStats]) {
        Self::document(&json!({ "libraries": stats }));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", json!({"success": false, "error": message}));
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn progress_line(message: &ProgressMessage) -> String {
    format!("  [{}] {}", message.channel, message.event.message)
}

/// JSON form of a run and, when it finished, its per-entity counts
pub fn run_json(run: &TaskRun, report: Option<&RunReport>) -> Value {
    let counters: serde_json::Map<String, Value> = report
        .map(|r| {
            r.counters
                .iter()
                .map(|(kind, c)| {
                    (
                        kind.label().to_string(),
                        json!({"inserted": c.inserted, "updated": c.updated}),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "id": run.id().to_string(),
        "task": run.name().as_str(),
        "trigger": run.trigger().as_str(),
        "result": run.result().as_str(),
        "time_run": run.time_run().to_rfc3339(),
        "duration_ms": run.duration_ms(),
        "counters": counters,
        "log": run.logged_data(),
    })
}

fn run_lines(run: &TaskRun, report: Option<&RunReport>) -> Vec<String> {
    let mark = if run.result() == TaskState::Success {
        '\u{2713}'
    } else {
        '\u{2717}'
    };
    let mut lines = vec![format!(
        "{mark} {} {} in {}",
        run.name().label(),
        run.result().as_str(),
        run.duration_ms().map(format_duration).unwrap_or_else(|| "-".into())
    )];

    if let Some(report) = report.filter(|r| !r.counters.is_empty()) {
        lines.push(String::new());
        lines.push(format!("  {:<14} {:>8} {:>8}", "Entity", "Inserted", "Updated"));
        for (kind, counter) in &report.counters {
            lines.push(format!(
                "  {:<14} {:>8} {:>8}",
                kind.label(),
                counter.inserted,
                counter.updated
            ));
        }
    }

    if !run.logged_data().is_empty() {
        lines.push(String::new());
        for line in run.logged_data() {
            lines.push(format!("  {:<7} {}", line.level.as_str(), line.message));
        }
    }
    lines
}

fn history_lines(runs: &[TaskRun], limit: u32) -> Vec<String> {
    if runs.is_empty() {
        return vec!["No task runs recorded yet.".into()];
    }

    let mut lines = vec![
        format!("Task History ({} runs)", runs.len()),
        String::new(),
        "  Started              Task           Trigger    Result   Duration".into(),
        "  -------------------- -------------- ---------- -------- --------".into(),
    ];
    lines.extend(runs.iter().map(history_row));

    if runs.len() as u32 >= limit {
        lines.push(String::new());
        lines.push(format!(
            "Showing {limit} runs (limit). Use --limit to show more."
        ));
    }
    lines
}

fn history_row(run: &TaskRun) -> String {
    let duration = match (run.result(), run.duration_ms()) {
        (TaskState::Running, _) | (_, None) => "-".to_string(),
        (_, Some(ms)) => format_duration(ms),
    };
    format!(
        "  {} {:<14} {:<10} {:<8} {}",
        run.time_run().format("%Y-%m-%d %H:%M:%S"),
        run.name().as_str(),
        run.trigger().as_str(),
        run.result().as_str(),
        duration
    )
}

fn stats_lines(stats: &[LibraryStats]) -> Vec<String> {
    if stats.is_empty() {
        return vec!["No libraries mirrored yet.".into()];
    }

    let mut lines = vec![
        format!("  {:<24} {:>7} {:>7} {:>8} {:>9}", "Library", "Items", "Seasons", "Episodes", "Played"),
        format!("  {} {} {} {} {}", "-".repeat(24), "-".repeat(7), "-".repeat(7), "-".repeat(8), "-".repeat(9)),
    ];
    for library in stats {
        lines.push(format!(
            "  {:<24} {:>7} {:>7} {:>8} {:>9}",
            library.library_name,
            library.item_count,
            library.season_count,
            library.episode_count,
            format_play_time(library.total_play_seconds)
        ));
    }
    lines
}

fn format_duration(ms: i64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

fn format_play_time(seconds: i64) -> String {
    format!("{}h{:02}m", seconds / 3_600, (seconds % 3_600) / 60)
}
