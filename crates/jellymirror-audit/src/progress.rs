//! Progress sinks
//!
//! [`TracingProgressSink`] writes every event to process logs.
//! [`BroadcastProgressSink`] additionally fans events out to in-process
//! subscribers over a `tokio::sync::broadcast` channel; slow or absent
//! subscribers never block the publisher.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info};

use jellymirror_core::domain::{ProgressEvent, ProgressKind};
use jellymirror_core::ports::IProgressSink;

/// Capacity of the broadcast ring buffer
const DEFAULT_CAPACITY: usize = 256;

/// An event together with the channel it was published on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressMessage {
    pub channel: String,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Logs progress events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl IProgressSink for TracingProgressSink {
    fn send(&self, channel: &str, event: ProgressEvent) {
        match event.kind {
            ProgressKind::Error => error!(channel, message = %event.message, "Task error"),
            kind => info!(channel, kind = ?kind, message = %event.message, "Task progress"),
        }
    }
}

/// Publishes progress events to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastProgressSink {
    tx: broadcast::Sender<ProgressMessage>,
    log: TracingProgressSink,
}

impl BroadcastProgressSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            log: TracingProgressSink,
        }
    }

    /// Receives every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressMessage> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl IProgressSink for BroadcastProgressSink {
    fn send(&self, channel: &str, event: ProgressEvent) {
        self.log.send(channel, event.clone());
        // No receivers is not an error
        let _ = self.tx.send(ProgressMessage {
            channel: channel.to_string(),
            event,
        });
    }
}
