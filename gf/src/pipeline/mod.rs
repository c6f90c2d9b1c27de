//! Pipeline orchestration
//!
//! The [`Orchestrator`] drives one run end to end: design chain, planning,
//! the step loop and final assembly. It owns the run's [`PipelineState`] and
//! reports every transition to a [`crate::events::ProgressSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

mod bundle;
mod orchestrator;
mod progress;
mod state;

pub use bundle::{GAME_FILE, GameBundle, MANIFEST_FILE};
pub use orchestrator::{Orchestrator, PipelineError};
pub use progress::{ASSEMBLY_WEIGHT, BUILD_WEIGHT, DESIGN_STAGE_WEIGHT, Milestone, PLANNING_WEIGHT, ProgressTracker};
pub use state::{PipelineState, RunMetadata};

/// Cooperative cancellation flag shared between a run and its caller
///
/// Checked at every stage boundary and after every LLM call returns; an
/// in-flight call is not interrupted but its result is thrown away.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        debug!("CancelToken::cancel: called");
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
