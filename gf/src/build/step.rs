//! Per-step execution: generate, validate, repair, merge
//!
//! ```text
//! Generating → Validating → {Repairing → Validating}* → Merging → Done
//! ```
//!
//! `Failed` is reachable from any state when generation itself fails or the
//! run is cancelled. Validation problems never fail a step: once the repair
//! budget is spent they become warnings and the fragment is merged anyway.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::design::{BuildStep, GameDefinition, Plan, StageContext, StageError};
use crate::llm::{CompleteOptions, Completion, TokenUsage, strip_code_fences};
use crate::merge::{MergeOutcome, merge};
use crate::pipeline::CancelToken;
use crate::validation::{CodeValidator, Diagnostic, DiagnosticKind, format_diagnostics, policy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Generating,
    Validating,
    Repairing,
    Merging,
    Done,
    Failed,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Generating => "generating",
            StepState::Validating => "validating",
            StepState::Repairing => "repairing",
            StepState::Merging => "merging",
            StepState::Done => "done",
            StepState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("step {step_id}: code generation failed: {source}")]
    Generation {
        step_id: u32,
        #[source]
        source: StageError,
    },

    #[error("step {step_id}: cancelled")]
    Cancelled { step_id: u32, usage: TokenUsage },
}

impl StepError {
    /// Tokens spent before the step stopped
    pub fn usage(&self) -> TokenUsage {
        match self {
            StepError::Generation { source, .. } => source.usage(),
            StepError::Cancelled { usage, .. } => *usage,
        }
    }
}

/// Result of one completed step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step_id: u32,
    /// The new accumulated program
    pub program: String,
    pub usage: TokenUsage,
    pub repairs: u32,
    pub warnings: Vec<String>,
    /// States visited, in order
    pub transitions: Vec<StepState>,
}

/// Everything a step needs to know about the run
pub struct StepInput<'a> {
    pub accumulated: &'a str,
    pub definition: &'a GameDefinition,
    pub plan: &'a Plan,
    pub step: &'a BuildStep,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StepPrompt<'a> {
    title: &'a str,
    description: &'a str,
    plan: &'a [BuildStep],
    step: &'a BuildStep,
    step_count: usize,
    accumulated: &'a str,
    rules: Vec<&'static str>,
}

#[derive(Serialize)]
struct RepairPrompt<'a> {
    step: &'a BuildStep,
    accumulated: &'a str,
    fragment: &'a str,
    diagnostics: String,
    rules: Vec<&'static str>,
}

pub struct StepRunner {
    ctx: StageContext,
    validator: Arc<dyn CodeValidator>,
    max_repair_attempts: u32,
}

impl StepRunner {
    pub fn new(ctx: StageContext, validator: Arc<dyn CodeValidator>, max_repair_attempts: u32) -> Self {
        Self {
            ctx,
            validator,
            max_repair_attempts,
        }
    }

    pub async fn run(&self, input: StepInput<'_>, cancel: &CancelToken) -> Result<StepOutcome, StepError> {
        let step_id = input.step.id;
        debug!(step_id, label = %input.step.label, "StepRunner::run: called");

        let mut transitions = vec![StepState::Generating];
        let mut usage = TokenUsage::default();
        let mut warnings = Vec::new();

        let fragment = match self.generate(&input).await {
            Ok(completion) => {
                usage = usage.add(&completion.usage);
                completion.value
            }
            Err(source) => {
                transitions.push(StepState::Failed);
                warn!(step_id, error = %source, "StepRunner::run: generation failed");
                return Err(StepError::Generation { step_id, source });
            }
        };
        if cancel.is_cancelled() {
            return Err(StepError::Cancelled { step_id, usage });
        }
        if fragment.trim().is_empty() {
            warnings.push(format!("step {}: the model returned no code", step_id));
        }

        // Problems already present before this step are not this step's to repair.
        // Lines shift when declarations are reordered, so compare without them.
        let baseline: HashSet<(DiagnosticKind, String)> = self
            .validator
            .validate(input.accumulated)
            .into_iter()
            .map(|d| (d.kind, d.message))
            .collect();

        let mut fragment = fragment;
        let mut repairs = 0;
        let merged = loop {
            transitions.push(StepState::Validating);
            let candidate = merge(input.accumulated, &fragment);
            let diagnostics: Vec<Diagnostic> = self
                .validator
                .validate(&candidate.code)
                .into_iter()
                .filter(|d| !baseline.contains(&(d.kind, d.message.clone())))
                .collect();

            if diagnostics.is_empty() {
                debug!(step_id, "StepRunner::run: fragment is clean");
                break candidate;
            }
            debug!(step_id, count = diagnostics.len(), "StepRunner::run: diagnostics found");

            if repairs >= self.max_repair_attempts {
                warn!(step_id, count = diagnostics.len(), "StepRunner::run: repair budget spent, merging anyway");
                warnings.extend(diagnostics.iter().map(|d| format!("step {}: {}", step_id, d)));
                break candidate;
            }

            transitions.push(StepState::Repairing);
            repairs += 1;
            match self.repair(&input, &fragment, &diagnostics).await {
                Ok(completion) => {
                    usage = usage.add(&completion.usage);
                    if cancel.is_cancelled() {
                        return Err(StepError::Cancelled { step_id, usage });
                    }
                    fragment = completion.value;
                }
                Err(e) => {
                    // Repair is best effort: keep the unrepaired fragment
                    usage = usage.add(&e.usage());
                    warn!(step_id, error = %e, "StepRunner::run: repair failed, keeping original fragment");
                    warnings.push(format!("step {}: repair failed: {}", step_id, e));
                    warnings.extend(diagnostics.iter().map(|d| format!("step {}: {}", step_id, d)));
                    break candidate;
                }
            }
        };

        transitions.push(StepState::Merging);
        let MergeOutcome { code, fallback } = merged;
        if let Some(reason) = fallback {
            warn!(step_id, %reason, "StepRunner::run: merge fell back to concatenation");
            warnings.push(format!("step {}: merge fell back to concatenation: {}", step_id, reason));
        }
        transitions.push(StepState::Done);

        info!(step_id, repairs, warnings = warnings.len(), "StepRunner::run: step done");
        Ok(StepOutcome {
            step_id,
            program: code,
            usage,
            repairs,
            warnings,
            transitions,
        })
    }

    async fn generate(&self, input: &StepInput<'_>) -> Result<Completion<String>, StageError> {
        let context = StepPrompt {
            title: &input.definition.title,
            description: &input.definition.description,
            plan: &input.plan.steps,
            step: input.step,
            step_count: input.plan.len(),
            accumulated: input.accumulated,
            rules: policy().map(|(_, description)| description).collect(),
        };
        let options = CompleteOptions::default().with_temperature(0.2);
        let completion = self.ctx.text("build", "step", &context, &options).await?;
        Ok(completion.map(|text| strip_code_fences(&text)))
    }

    async fn repair(
        &self,
        input: &StepInput<'_>,
        fragment: &str,
        diagnostics: &[Diagnostic],
    ) -> Result<Completion<String>, StageError> {
        debug!(step_id = input.step.id, count = diagnostics.len(), "StepRunner::repair: called");
        let context = RepairPrompt {
            step: input.step,
            accumulated: input.accumulated,
            fragment,
            diagnostics: format_diagnostics(diagnostics),
            rules: policy().map(|(_, description)| description).collect(),
        };
        let options = CompleteOptions::default().with_temperature(0.0);
        let completion = self.ctx.text("repair", "repair", &context, &options).await?;
        Ok(completion.map(|text| strip_code_fences(&text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Playability;
    use crate::design::testing::{context, context_with};
    use crate::llm::client::mock::{MockLlmClient, MockReply};
    use crate::validation::ScopeValidator;

    fn definition() -> GameDefinition {
        GameDefinition {
            title: "Coin Dash".into(),
            description: "Grab coins.".into(),
            mechanics: vec!["move".into()],
            win_condition: "Collect all coins.".into(),
            entities: vec!["player".into()],
            playability: Playability::Valid,
        }
    }

    fn plan() -> Plan {
        Plan::new(vec![
            BuildStep::new(1, "Set up canvas"),
            BuildStep::new(2, "Move the player"),
            BuildStep::new(3, "Show win message"),
        ])
    }

    fn runner(ctx: StageContext, repairs: u32) -> StepRunner {
        StepRunner::new(ctx, Arc::new(ScopeValidator::default()), repairs)
    }

    async fn run(runner: &StepRunner, accumulated: &str, step: usize) -> Result<StepOutcome, StepError> {
        let definition = definition();
        let plan = plan();
        let input = StepInput {
            accumulated,
            definition: &definition,
            plan: &plan,
            step: &plan.steps[step],
        };
        runner.run(input, &CancelToken::new()).await
    }

    #[tokio::test]
    async fn test_clean_fragment_goes_straight_to_merge() {
        let (ctx, client) = context(vec![MockReply::text("```js\nlet player = { x: 0 };\n```")]);
        let out = run(&runner(ctx, 1), "", 0).await.unwrap();
        assert_eq!(
            out.transitions,
            vec![StepState::Generating, StepState::Validating, StepState::Merging, StepState::Done]
        );
        assert_eq!(out.program, "let player = { x: 0 };\n");
        assert_eq!(out.repairs, 0);
        assert_eq!(out.usage.total(), 15);
        assert_eq!(client.call_count(), 1);
        assert!(client.prompts()[0].contains("Build step 1 of 3"));
    }

    #[tokio::test]
    async fn test_repair_fixes_undeclared_identifier() {
        let (ctx, client) = context(vec![
            MockReply::text("function move() {\n    player.x += speed;\n}"),
            MockReply::text("const speed = 2;\nfunction move() {\n    player.x += speed;\n}"),
        ]);
        let out = run(&runner(ctx, 1), "let player = { x: 0 };\n", 1).await.unwrap();
        assert_eq!(
            out.transitions,
            vec![
                StepState::Generating,
                StepState::Validating,
                StepState::Repairing,
                StepState::Validating,
                StepState::Merging,
                StepState::Done
            ]
        );
        assert_eq!(out.repairs, 1);
        assert!(out.warnings.is_empty());
        assert!(out.program.contains("const speed = 2;"));
        assert!(client.prompts()[1].contains("`speed` is used but never declared"));
        assert_eq!(out.usage.total(), 30);
    }

    #[tokio::test]
    async fn test_malformed_expression_is_repaired() {
        let (ctx, client) = context(vec![MockReply::text("let lives = ;"), MockReply::text("let lives = 3;")]);
        let out = run(&runner(ctx, 1), "let player = { x: 0 };\n", 1).await.unwrap();
        assert_eq!(out.repairs, 1);
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        assert!(out.program.contains("let lives = 3;"));
        assert!(!out.program.contains("= ;"));
        assert!(client.prompts()[1].contains("syntax_error"));
    }

    #[tokio::test]
    async fn test_unrepaired_diagnostics_become_warnings() {
        let (ctx, _) = context(vec![
            MockReply::text("function move() { player.x += speed; }"),
            MockReply::text("function move() { player.x += speed; }"),
        ]);
        let out = run(&runner(ctx, 1), "let player = { x: 0 };\n", 1).await.unwrap();
        assert_eq!(out.repairs, 1);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("speed"));
        assert!(out.program.contains("function move()"));
    }

    #[tokio::test]
    async fn test_zero_repair_budget() {
        let (ctx, client) = context(vec![MockReply::text("score += 1;")]);
        let out = run(&runner(ctx, 0), "", 1).await.unwrap();
        assert_eq!(out.repairs, 0);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_repair_provider_failure_is_recoverable() {
        let (ctx, _) = context(vec![MockReply::text("score += 1;"), MockReply::Fail(503)]);
        let out = run(&runner(ctx, 1), "", 1).await.unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("repair failed")));
        assert!(out.program.contains("score += 1;"));
        assert_eq!(out.transitions.last(), Some(&StepState::Done));
    }

    #[tokio::test]
    async fn test_generation_failure_fails_the_step() {
        let (ctx, _) = context(vec![MockReply::Fail(500)]);
        let err = run(&runner(ctx, 1), "", 0).await.unwrap_err();
        assert!(matches!(err, StepError::Generation { step_id: 1, .. }));
    }

    #[tokio::test]
    async fn test_existing_problems_do_not_trigger_repair() {
        let (ctx, client) = context(vec![MockReply::text("let lives = 3;")]);
        let out = run(&runner(ctx, 1), "score += 1;\n", 1).await.unwrap();
        assert_eq!(out.repairs, 0);
        assert_eq!(client.call_count(), 1);
        assert!(out.program.contains("let lives = 3;"));
    }

    #[tokio::test]
    async fn test_broken_fragment_falls_back_to_concatenation() {
        let (ctx, _) = context(vec![
            MockReply::text("function draw( {"),
            MockReply::text("function draw( {"),
        ]);
        let out = run(&runner(ctx, 1), "let a = 1;", 2).await.unwrap();
        assert_eq!(out.program, "let a = 1;\nfunction draw( {");
        assert!(out.warnings.iter().any(|w| w.contains("concatenation")));
        assert!(out.warnings.iter().any(|w| w.contains("syntax_error")));
    }

    #[tokio::test]
    async fn test_cancel_discards_generated_code() {
        let client = Arc::new(MockLlmClient::new(vec![MockReply::text("let a = 1;")]));
        let runner = runner(context_with(client), 1);
        let definition = definition();
        let plan = plan();
        let cancel = CancelToken::new();
        cancel.cancel();
        let input = StepInput {
            accumulated: "",
            definition: &definition,
            plan: &plan,
            step: &plan.steps[0],
        };
        let err = runner.run(input, &cancel).await.unwrap_err();
        assert!(matches!(err, StepError::Cancelled { step_id: 1, .. }));
        assert_eq!(err.usage().total(), 15);
    }
}
