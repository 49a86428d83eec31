//! Jellymirror Audit - Task run log and progress reporting
//!
//! Provides:
//! - `TaskLogger`: Records the durable lifecycle of each run through `ITaskLog`
//! - `TracingProgressSink` / `BroadcastProgressSink`: Progress event delivery
//!   to process logs or to in-process subscribers

pub mod logger;
pub mod progress;

pub use logger::TaskLogger;
pub use progress::{BroadcastProgressSink, ProgressMessage, TracingProgressSink};
