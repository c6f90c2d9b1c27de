//! Planner: GameDefinition → ordered build steps

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{BuildStep, GameDefinition, Plan, Stage, StageContext, StageError, StageErrorKind};
use crate::llm::{CompleteOptions, Completion, GatewayError};

const SETUP_LABEL: &str = "Set up the canvas, the 2D context and the initial game state";
const WIN_LOSE_LABEL: &str = "Implement the win and lose conditions and draw the win/lose message on the canvas";

#[derive(Deserialize)]
struct PlanReply {
    steps: Vec<StepReply>,
}

#[derive(Deserialize)]
struct StepReply {
    id: i64,
    label: String,
}

pub struct Planner {
    ctx: StageContext,
}

impl Planner {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    fn plan_invalid(&self, message: impl Into<String>) -> StageError {
        StageError::new(self.name(), StageErrorKind::PlanInvalid(message.into()))
    }
}

/// Order by the model's ids, add missing bookends, renumber from 1
fn shape_plan(reply: PlanReply) -> Option<Plan> {
    let mut steps: Vec<(i64, String)> = reply
        .steps
        .into_iter()
        .map(|s| (s.id, s.label.trim().to_string()))
        .filter(|(_, label)| !label.is_empty())
        .collect();
    if steps.is_empty() {
        return None;
    }
    steps.sort_by_key(|(id, _)| *id);

    let mut labels: Vec<String> = steps.into_iter().map(|(_, label)| label).collect();
    if !BuildStep::new(0, labels[0].as_str()).is_setup() {
        debug!(first = %labels[0], "shape_plan: inserting setup step");
        labels.insert(0, SETUP_LABEL.to_string());
    }
    let last = labels.len() - 1;
    if !BuildStep::new(0, labels[last].as_str()).is_win_lose() {
        debug!(last = %labels[last], "shape_plan: appending win/lose step");
        labels.push(WIN_LOSE_LABEL.to_string());
    }

    Some(Plan::new(
        labels
            .into_iter()
            .zip(1u32..)
            .map(|(label, id)| BuildStep::new(id, label))
            .collect(),
    ))
}

#[async_trait]
impl Stage for Planner {
    type Input = GameDefinition;
    type Output = Plan;

    fn name(&self) -> &'static str {
        "planning"
    }

    async fn invoke(&self, definition: &GameDefinition) -> Result<Completion<Plan>, StageError> {
        debug!(title = %definition.title, "Planner::invoke: called");
        let schema = json!({
            "type": "object",
            "required": ["steps"],
            "properties": {
                "steps": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "required": ["id", "label"],
                        "properties": {
                            "id": { "type": "integer" },
                            "label": { "type": "string" }
                        }
                    }
                }
            }
        });
        let context = json!({ "definition": definition.to_prompt_json() });

        let reply = match self
            .ctx
            .structured::<PlanReply, _>(self.name(), "plan", &context, &schema, &CompleteOptions::default())
            .await
        {
            Ok(reply) => reply,
            Err(StageError {
                kind: StageErrorKind::Gateway(GatewayError::Schema { message, .. }),
                ..
            }) => {
                warn!(%message, "Planner::invoke: malformed plan");
                return Err(self.plan_invalid(format!("malformed plan: {}", message)));
            }
            Err(e) => return Err(e),
        };

        let usage = reply.usage;
        let plan = shape_plan(reply.value).ok_or_else(|| self.plan_invalid("the planner returned no steps"))?;
        plan.check().map_err(|e| self.plan_invalid(e))?;
        info!(steps = plan.len(), "Planner::invoke: plan ready");
        Ok(Completion { value: plan, usage })
    }
}
