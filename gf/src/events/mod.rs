//! Pipeline event streaming
//!
//! ```text
//!   Orchestrator ──(ProgressSink)──▶ EventEmitter ──▶ EventBus (broadcast)
//!                                                      │            │
//!                                                      ▼            ▼
//!                                               CLI printer    EventLogger
//!                                                              (runs/<id>/events.jsonl)
//! ```
//!
//! Every run emits `PipelineStatus` events with non-decreasing progress and
//! ends with either a status at exactly `1.0` or a single `PipelineError`.

mod bus;
mod logger;
mod sink;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use logger::{EventLogger, read_run_events, spawn_event_logger};
pub use sink::ProgressSink;
pub use types::{EventLogEntry, Phase, PipelineEvent};
