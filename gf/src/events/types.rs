//! Event types for pipeline progress streaming
//!
//! The wire shape is camelCase JSON with a `type` tag:
//!
//! ```json
//! {"type":"PipelineStatus","runId":"…","progress":0.42,"phase":{"name":"build-step-2"},"tokenCount":1830,"timestamp":"…"}
//! {"type":"PipelineError","runId":"…","stage":"planning","message":"…","tokenCount":1830,"timestamp":"…"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named pipeline phase shown to observers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
}

impl Phase {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Everything a run reports to the outside
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A meaningful transition happened
    #[serde(rename_all = "camelCase")]
    PipelineStatus {
        run_id: String,
        /// Fraction done in `[0, 1]`, never decreasing within a run
        progress: f64,
        phase: Phase,
        /// Authoritative running total, not an increment
        token_count: u64,
        timestamp: DateTime<Utc>,
    },
    /// The run failed; nothing follows this for the same run
    #[serde(rename_all = "camelCase")]
    PipelineError {
        run_id: String,
        stage: String,
        message: String,
        token_count: u64,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn status(run_id: &str, progress: f64, phase: &str, token_count: u64) -> Self {
        PipelineEvent::PipelineStatus {
            run_id: run_id.to_string(),
            progress,
            phase: Phase::new(phase),
            token_count,
            timestamp: Utc::now(),
        }
    }

    pub fn error(run_id: &str, stage: &str, message: impl Into<String>, token_count: u64) -> Self {
        PipelineEvent::PipelineError {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            message: message.into(),
            token_count,
            timestamp: Utc::now(),
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            PipelineEvent::PipelineStatus { run_id, .. } | PipelineEvent::PipelineError { run_id, .. } => run_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::PipelineStatus { .. } => "PipelineStatus",
            PipelineEvent::PipelineError { .. } => "PipelineError",
        }
    }

    pub fn token_count(&self) -> u64 {
        match self {
            PipelineEvent::PipelineStatus { token_count, .. } | PipelineEvent::PipelineError { token_count, .. } => {
                *token_count
            }
        }
    }

    /// Progress carried by a status event
    pub fn progress(&self) -> Option<f64> {
        match self {
            PipelineEvent::PipelineStatus { progress, .. } => Some(*progress),
            PipelineEvent::PipelineError { .. } => None,
        }
    }

    pub fn is_terminal_error(&self) -> bool {
        matches!(self, PipelineEvent::PipelineError { .. })
    }
}

/// Event log entry for JSONL persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// When the entry was written
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: PipelineEvent,
}

impl EventLogEntry {
    pub fn new(event: PipelineEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
