//! Run-scoped pipeline state

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::design::{GameDefinition, Plan};
use crate::llm::TokenUsage;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Everything one run knows about itself
///
/// Owned by the orchestrator; stages receive copies of what they need and
/// never write here directly.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub run_id: String,
    /// Total tokens spent so far; only ever grows
    pub token_count: u64,
    pub current_step: Option<u32>,
    pub plan: Option<Plan>,
    pub game_def: Option<GameDefinition>,
    /// The program built so far
    pub accumulated: String,
    pub warnings: Vec<String>,
    pub metadata: RunMetadata,
}

impl PipelineState {
    pub fn new() -> Self {
        let run_id = Uuid::now_v7().to_string();
        debug!(%run_id, "PipelineState::new: called");
        let now = Utc::now();
        Self {
            run_id,
            token_count: 0,
            current_step: None,
            plan: None,
            game_def: None,
            accumulated: String::new(),
            warnings: Vec::new(),
            metadata: RunMetadata {
                started_at: now,
                last_update: now,
            },
        }
    }

    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.token_count += usage.total();
        self.touch();
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
        self.touch();
    }

    pub fn touch(&mut self) {
        self.metadata.last_update = Utc::now();
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_get_distinct_ids() {
        let a = PipelineState::new();
        let b = PipelineState::new();
        assert_ne!(a.run_id, b.run_id);
        assert!(Uuid::parse_str(&a.run_id).is_ok());
    }

    #[test]
    fn test_usage_accumulates() {
        let mut state = PipelineState::new();
        let before = state.metadata.last_update;
        state.add_usage(&TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        });
        state.add_usage(&TokenUsage {
            input_tokens: 1,
            output_tokens: 1,
        });
        assert_eq!(state.token_count, 17);
        assert!(state.metadata.last_update >= before);
    }
}
