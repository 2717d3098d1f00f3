//! Structured events emitted by the engine.
//!
//! Consumers subscribe to the event stream to build dashboards, alerting,
//! or to assert on engine behavior in tests. Publishing is fire-and-forget:
//! a slow or absent subscriber never stalls the timer or a worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::model::EngineState;

const EVENT_CAPACITY: usize = 1024;

/// A structured event emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    StateTransition {
        from: EngineState,
        to: EngineState,
    },
    Fired {
        sequence: u32,
    },
    Submitted {
        sequence: u32,
    },
    Dropped {
        sequence: u32,
        reason: String,
    },
    Appended {
        sequence: u32,
        bytes: usize,
    },
    AppendFailed {
        sequence: u32,
        error: String,
    },
    Drained {
        processed: u64,
        failed: u64,
    },
    Terminal {
        total: u32,
        written: bool,
    },
}

/// Broadcast fan-out for [`Event`]s. Cloning shares the channel and the
/// sequence counter.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    seq: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, kind: EventKind) {
        let event = Event {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Utc::now(),
            kind,
        };
        // No receivers is fine.
        let _ = self.tx.send(event);
    }
}
