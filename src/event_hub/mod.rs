//! EventHub - Outbound engine signals
//!
//! ## Responsibilities
//!
//! - Connectivity change notifications (edge-triggered)
//! - Session lifecycle notifications (started / restarted / ended)
//! - Capture results
//!
//! Delivery is a tokio broadcast channel; a slow subscriber lags and loses
//! the oldest events, it never blocks the engine.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffered events per subscriber
const EVENT_CAPACITY: usize = 64;

/// Engine event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum EngineEvent {
    /// Device reachability flipped
    ConnectivityChanged { connected: bool },
    /// New session installed after a probe-driven connect
    SessionStarted { handle: u64 },
    /// Supervisor replaced the session (forced or manual restart)
    SessionRestarted { handle: u64, retry_budget: u32 },
    /// Session discarded after a disconnect
    SessionEnded { handle: u64 },
    /// Outcome of a capture request
    CaptureResult {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Broadcast hub for one engine instance
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventHub {
    /// Create new EventHub
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event (no-op without subscribers)
    pub fn publish(&self, event: EngineEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
