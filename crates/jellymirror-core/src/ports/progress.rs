//! Progress sink port
//!
//! Progress events are fire-and-forget: a sink must never block the run
//! and delivery failures are not reported back.

use crate::domain::ProgressEvent;

pub trait IProgressSink: Send + Sync {
    /// Publishes `event` on the named channel
    fn send(&self, channel: &str, event: ProgressEvent);
}
