//! Event Bus - central pub/sub for pipeline events
//!
//! The EventBus uses a tokio broadcast channel so that any number of
//! consumers (CLI printer, JSONL logger) see every run's events. Runs hold an
//! [`EventEmitter`] bound to their run id.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::PipelineEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Central event bus shared by concurrent runs
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped, and a full
    /// channel drops the oldest events for lagging receivers.
    pub fn emit(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), run_id = event.run_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Events emitted before subscribing are not received
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// An emitter handle bound to one run
    pub fn emitter_for(&self, run_id: impl Into<String>) -> EventEmitter {
        let run_id = run_id.into();
        debug!(%run_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            run_id,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cheap-to-clone handle for emitting one run's events
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PipelineEvent>,
    run_id: String,
}

impl EventEmitter {
    pub fn emit(&self, event: PipelineEvent) {
        debug!(run_id = %self.run_id, event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }
}

/// Create a shared event bus with the given capacity
pub fn create_event_bus(capacity: usize) -> Arc<EventBus> {
    Arc::new(EventBus::new(capacity))
}
