//! Design and planning stage chain
//!
//! Idea → LoopClarifier → MechanicExtractor → WinConditionBuilder →
//! EntityListBuilder → PlayabilityHeuristic → FinalAssembler, with AutoFix
//! on an unplayable design and the Planner turning the result into build
//! steps. Each stage checks its own output and fails with a [`StageError`]
//! naming itself rather than passing malformed data on.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::llm::{CompleteOptions, Completion, GatewayError, LlmGateway, TokenUsage};
use crate::prompts::PromptLoader;

mod planner;
mod playability;
mod stages;
mod types;

pub use planner::Planner;
pub use playability::{PlayabilityHeuristic, assess};
pub use stages::{
    AssemblyInput, AutoFix, AutoFixRequest, EntityListBuilder, FinalAssembler, IdeaStage, LoopClarifier,
    MechanicExtractor, WinConditionBuilder,
};
pub use types::{BuildStep, Concept, DesignDraft, GameDefinition, Plan, Playability, dedup_tags};

/// One typed transformation in the chain
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Sync;
    type Output: Send;

    /// Stage name used in errors, logs and progress events
    fn name(&self) -> &'static str;

    async fn invoke(&self, input: &Self::Input) -> Result<Completion<Self::Output>, StageError>;
}

#[derive(Debug, Error)]
pub enum StageErrorKind {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid output: {0}")]
    InvalidOutput(String),

    #[error("invalid plan: {0}")]
    PlanInvalid(String),

    #[error("prompt error: {0}")]
    Prompt(String),
}

/// A stage failure, tagged with the stage that failed
#[derive(Debug, Error)]
#[error("{stage}: {kind}")]
pub struct StageError {
    pub stage: &'static str,
    #[source]
    pub kind: StageErrorKind,
}

impl StageError {
    pub fn new(stage: &'static str, kind: StageErrorKind) -> Self {
        Self { stage, kind }
    }

    pub fn invalid(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, StageErrorKind::InvalidOutput(message.into()))
    }

    /// Provider unavailable or timed out, as opposed to a bad reply
    pub fn is_provider(&self) -> bool {
        matches!(&self.kind, StageErrorKind::Gateway(e) if e.is_provider())
    }

    /// Tokens spent before the stage failed
    pub fn usage(&self) -> TokenUsage {
        match &self.kind {
            StageErrorKind::Gateway(e) => e.usage(),
            _ => TokenUsage::default(),
        }
    }
}

/// What every LLM-backed stage needs
#[derive(Clone)]
pub struct StageContext {
    pub gateway: Arc<LlmGateway>,
    pub prompts: Arc<PromptLoader>,
}

impl StageContext {
    pub fn new(gateway: Arc<LlmGateway>, prompts: Arc<PromptLoader>) -> Self {
        Self { gateway, prompts }
    }

    pub fn render<C: Serialize>(&self, stage: &'static str, template: &str, context: &C) -> Result<String, StageError> {
        self.prompts
            .render(template, context)
            .map_err(|e| StageError::new(stage, StageErrorKind::Prompt(e.to_string())))
    }

    /// Render `template` and ask for JSON matching `schema`, deserialized into `T`
    pub async fn structured<T, C>(
        &self,
        stage: &'static str,
        template: &str,
        context: &C,
        schema: &Value,
        options: &CompleteOptions,
    ) -> Result<Completion<T>, StageError>
    where
        T: DeserializeOwned,
        C: Serialize + Sync,
    {
        let prompt = self.render(stage, template, context)?;
        debug!(stage, template, "StageContext::structured: calling gateway");
        self.gateway
            .complete_as::<T>(&prompt, schema, options)
            .await
            .map_err(|e| StageError::new(stage, e.into()))
    }

    /// Render `template` and ask for free text
    pub async fn text<C>(
        &self,
        stage: &'static str,
        template: &str,
        context: &C,
        options: &CompleteOptions,
    ) -> Result<Completion<String>, StageError>
    where
        C: Serialize + Sync,
    {
        let prompt = self.render(stage, template, context)?;
        debug!(stage, template, "StageContext::text: calling gateway");
        self.gateway
            .complete(&prompt, options)
            .await
            .map_err(|e| StageError::new(stage, e.into()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_stage_error_names_stage() {
        let err = StageError::invalid("mechanics", "no tags");
        assert_eq!(err.to_string(), "mechanics: invalid output: no tags");
        assert!(!err.is_provider());
    }

    #[test]
    fn test_provider_errors_are_distinct() {
        let err = StageError::new(
            "idea",
            GatewayError::Provider(LlmError::Timeout(std::time::Duration::from_secs(1))).into(),
        );
        assert!(err.is_provider());

        let err = StageError::new(
            "idea",
            GatewayError::Schema {
                message: "bad".into(),
                raw: "{}".into(),
                usage: TokenUsage {
                    input_tokens: 3,
                    output_tokens: 4,
                },
            }
            .into(),
        );
        assert!(!err.is_provider());
        assert_eq!(err.usage().total(), 7);
    }
}
