//! End-to-end run driver

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::bundle::GameBundle;
use super::progress::{Milestone, ProgressTracker};
use super::state::PipelineState;
use super::CancelToken;
use crate::build::{PlayabilityProbe, StaticProbe, StepError, StepInput, StepRunner, classify, static_sanity};
use crate::config::PipelineConfig;
use crate::design::{
    AssemblyInput, AutoFix, AutoFixRequest, DesignDraft, EntityListBuilder, FinalAssembler, GameDefinition, IdeaStage,
    LoopClarifier, MechanicExtractor, Plan, Planner, Playability, PlayabilityHeuristic, Stage, StageContext,
    StageError, StageErrorKind, WinConditionBuilder,
};
use crate::events::{PipelineEvent, ProgressSink};
use crate::validation::{self, CodeValidator, RuleViolation, ScopeValidator};

const FINAL_ASSEMBLY: &str = "final-assembly";

/// Why a run stopped
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Stage(StageError),

    #[error(transparent)]
    Step(StepError),

    #[error("planning: {0}")]
    PlanInvalid(String),

    #[error("{stage}: run cancelled")]
    Cancelled { stage: String },

    #[error("final-assembly: the program breaks {} platform rule(s)", .violations.len())]
    RuleViolation { violations: Vec<RuleViolation> },
}

impl PipelineError {
    /// Stage reported in the terminal error event
    pub fn stage(&self) -> &str {
        match self {
            PipelineError::Stage(e) => e.stage,
            PipelineError::Step(_) => "build",
            PipelineError::PlanInvalid(_) => "planning",
            PipelineError::Cancelled { stage } => stage,
            PipelineError::RuleViolation { .. } => FINAL_ASSEMBLY,
        }
    }
}

impl From<StageError> for PipelineError {
    fn from(e: StageError) -> Self {
        match e {
            StageError {
                kind: StageErrorKind::PlanInvalid(message),
                ..
            } => PipelineError::PlanInvalid(message),
            other => PipelineError::Stage(other),
        }
    }
}

/// Per-run bookkeeping: state, progress and where events go
struct Run<'a> {
    state: PipelineState,
    progress: ProgressTracker,
    sink: &'a dyn ProgressSink,
    cancel: &'a CancelToken,
}

impl Run<'_> {
    fn report(&mut self, phase: &str, milestone: Milestone) {
        let progress = self.progress.advance(milestone);
        self.emit_status(phase, progress);
    }

    fn finish(&mut self) {
        let progress = self.progress.finish();
        self.emit_status("complete", progress);
    }

    fn emit_status(&mut self, phase: &str, progress: f64) {
        self.state.touch();
        info!(phase, progress, tokens = self.state.token_count, "Run: status");
        self.sink.send(PipelineEvent::status(
            &self.state.run_id,
            progress,
            phase,
            self.state.token_count,
        ));
    }

    fn warn(&mut self, warning: String) {
        warn!(%warning, "Run: warning");
        self.state.warn(warning);
    }

    fn check_cancel(&self, stage: &str) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            info!(stage, "Run: cancelled");
            return Err(PipelineError::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }

    /// Invoke one stage, count its tokens, and drop the result if the run was cancelled meanwhile
    async fn stage<S: Stage>(&mut self, stage: &S, input: &S::Input) -> Result<S::Output, PipelineError> {
        let name = stage.name();
        self.check_cancel(name)?;
        debug!(stage = name, "Run::stage: invoking");

        let result = stage.invoke(input).await;
        match result {
            Ok(completion) => {
                self.state.add_usage(&completion.usage);
                self.check_cancel(name)?;
                Ok(completion.value)
            }
            Err(e) => {
                self.state.add_usage(&e.usage());
                self.check_cancel(name)?;
                Err(e.into())
            }
        }
    }
}

/// Drives one game from seed to bundle
pub struct Orchestrator {
    ctx: StageContext,
    config: PipelineConfig,
    validator: Arc<dyn CodeValidator>,
    probe: Arc<dyn PlayabilityProbe>,
}

impl Orchestrator {
    pub fn new(ctx: StageContext, config: PipelineConfig) -> Self {
        Self {
            ctx,
            config,
            validator: Arc::new(ScopeValidator::default()),
            probe: Arc::new(StaticProbe),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn CodeValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn PlayabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Run the whole pipeline
    ///
    /// On failure exactly one `PipelineError` event is sent and nothing after it.
    /// Everything logged during the run carries its `run_id`.
    #[tracing::instrument(skip_all, fields(run_id = %state.run_id))]
    pub async fn run(
        &self,
        state: PipelineState,
        seed: Option<String>,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<GameBundle, PipelineError> {
        info!(?seed, "Orchestrator::run: called");
        let mut run = Run {
            state,
            progress: ProgressTracker::new(),
            sink,
            cancel,
        };

        match self.execute(&mut run, seed).await {
            Ok(bundle) => {
                info!(tokens = bundle.token_count, "Orchestrator::run: done");
                Ok(bundle)
            }
            Err(e) => {
                error!(stage = e.stage(), error = %e, "Orchestrator::run: failed");
                run.sink.send(PipelineEvent::error(
                    &run.state.run_id,
                    e.stage(),
                    e.to_string(),
                    run.state.token_count,
                ));
                Err(e)
            }
        }
    }

    async fn execute(&self, run: &mut Run<'_>, seed: Option<String>) -> Result<GameBundle, PipelineError> {
        run.report("start", Milestone::Checkpoint);
        let definition = self.design(run, seed).await?;
        let plan = self.plan(run, &definition).await?;
        self.build(run, &definition, &plan).await?;
        self.assemble(run, definition, plan).await
    }

    async fn design(&self, run: &mut Run<'_>, seed: Option<String>) -> Result<GameDefinition, PipelineError> {
        let idea = IdeaStage::new(self.ctx.clone());
        let concept = run.stage(&idea, &seed).await?;
        run.report(idea.name(), Milestone::DesignStage);

        let clarifier = LoopClarifier::new(self.ctx.clone());
        let game_loop = run.stage(&clarifier, &concept).await?;
        run.report(clarifier.name(), Milestone::DesignStage);

        let mut draft = DesignDraft::from_concept(concept);
        draft.game_loop = game_loop;

        let extractor = MechanicExtractor::new(self.ctx.clone());
        let mechanics = run.stage(&extractor, &draft).await?;
        draft.mechanics = mechanics;
        run.report(extractor.name(), Milestone::DesignStage);

        let win = WinConditionBuilder::new(self.ctx.clone());
        let win_condition = run.stage(&win, &draft).await?;
        draft.win_condition = win_condition;
        run.report(win.name(), Milestone::DesignStage);

        let entities = EntityListBuilder::new(self.ctx.clone());
        let entity_list = run.stage(&entities, &draft).await?;
        draft.entities = entity_list;
        run.report(entities.name(), Milestone::DesignStage);

        let playability = run.stage(&PlayabilityHeuristic, &draft.to_definition()).await?;
        run.report(PlayabilityHeuristic.name(), Milestone::Checkpoint);

        let mut definition = run.stage(&FinalAssembler, &AssemblyInput { draft, playability }).await?;
        run.report(FinalAssembler.name(), Milestone::Checkpoint);

        let autofix = AutoFix::new(self.ctx.clone());
        let mut attempts = 0;
        while let Playability::Invalid(reason) = &definition.playability {
            let reason = reason.clone();
            if attempts >= self.config.max_autofix_attempts {
                run.warn(format!(
                    "design still judged unplayable after {} autofix attempt(s): {}",
                    attempts, reason
                ));
                break;
            }
            attempts += 1;
            info!(attempts, %reason, "Orchestrator::design: design unplayable, auto-fixing");

            let request = AutoFixRequest {
                definition: definition.clone(),
                suggestion: reason,
            };
            let replacement = run.stage(&autofix, &request).await?;
            let verdict = run.stage(&PlayabilityHeuristic, &replacement).await?;
            definition = GameDefinition {
                playability: verdict,
                ..replacement
            };
            run.report(autofix.name(), Milestone::Checkpoint);
        }

        run.state.game_def = Some(definition.clone());
        Ok(definition)
    }

    async fn plan(&self, run: &mut Run<'_>, definition: &GameDefinition) -> Result<Plan, PipelineError> {
        let planner = Planner::new(self.ctx.clone());
        let plan = run.stage(&planner, definition).await?;
        plan.check().map_err(PipelineError::PlanInvalid)?;

        run.progress.set_step_count(plan.len());
        run.state.plan = Some(plan.clone());
        run.report(planner.name(), Milestone::Planning);
        Ok(plan)
    }

    async fn build(&self, run: &mut Run<'_>, definition: &GameDefinition, plan: &Plan) -> Result<(), PipelineError> {
        let runner = StepRunner::new(
            self.ctx.clone(),
            self.validator.clone(),
            self.config.max_repair_attempts,
        );

        for step in &plan.steps {
            let phase = format!("build-step-{}", step.id);
            run.check_cancel(&phase)?;
            run.state.current_step = Some(step.id);

            let input = StepInput {
                accumulated: &run.state.accumulated,
                definition,
                plan,
                step,
            };
            let result = runner.run(input, run.cancel).await;

            match result {
                Ok(outcome) => {
                    run.state.add_usage(&outcome.usage);
                    run.state.accumulated = outcome.program;
                    for warning in outcome.warnings {
                        run.warn(warning);
                    }
                    run.report(&phase, Milestone::BuildStep);
                }
                Err(e) => {
                    run.state.add_usage(&e.usage());
                    return Err(match e {
                        StepError::Cancelled { .. } => PipelineError::Cancelled { stage: phase },
                        other => PipelineError::Step(other),
                    });
                }
            }
        }
        run.state.current_step = None;
        Ok(())
    }

    async fn assemble(
        &self,
        run: &mut Run<'_>,
        definition: GameDefinition,
        plan: Plan,
    ) -> Result<GameBundle, PipelineError> {
        run.check_cancel(FINAL_ASSEMBLY)?;
        let code = run.state.accumulated.clone();
        debug!(len = code.len(), probe = self.probe.name(), "Orchestrator::assemble: called");

        let sanity = static_sanity(&code);
        let probe = self.probe.probe(&code).await;
        let compliance = validation::check(&code);
        let feedback = classify(&sanity, &probe, &compliance);

        for problem in &sanity.problems {
            run.warn(format!("sanity: {}", problem));
        }
        if !compliance.compliant {
            if self.config.block_on_rule_violation {
                return Err(PipelineError::RuleViolation {
                    violations: compliance.violations,
                });
            }
            for diagnostic in compliance.to_diagnostics() {
                run.warn(diagnostic.to_string());
            }
        }
        if !feedback.is_accept() {
            info!(?feedback, "Orchestrator::assemble: final checks did not pass");
        }

        run.report(FINAL_ASSEMBLY, Milestone::Assembly);
        run.finish();

        Ok(GameBundle {
            run_id: run.state.run_id.clone(),
            definition,
            plan,
            code,
            sanity,
            probe,
            compliance,
            feedback,
            warnings: run.state.warnings.clone(),
            token_count: run.state.token_count,
        })
    }
}
