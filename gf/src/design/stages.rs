//! LLM-backed design stages and the final assembler

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{
    Concept, DesignDraft, GameDefinition, Playability, Stage, StageContext, StageError, dedup_tags,
};
use crate::llm::{CompleteOptions, Completion, TokenUsage};

/// Schema for an object with one required property
fn single_field(name: &str, property: Value) -> Value {
    let mut properties = Map::new();
    properties.insert(name.to_string(), property);
    json!({
        "type": "object",
        "required": [name],
        "properties": properties
    })
}

fn string_field(name: &str) -> Value {
    single_field(name, json!({ "type": "string", "minLength": 1 }))
}

fn list_field(name: &str) -> Value {
    single_field(
        name,
        json!({ "type": "array", "minItems": 1, "items": { "type": "string" } }),
    )
}

fn definition_schema() -> Value {
    json!({
        "type": "object",
        "required": ["title", "description", "mechanics", "winCondition", "entities"],
        "properties": {
            "title": { "type": "string", "minLength": 1 },
            "description": { "type": "string", "minLength": 1 },
            "mechanics": { "type": "array", "minItems": 1, "items": { "type": "string" } },
            "winCondition": { "type": "string", "minLength": 1 },
            "entities": { "type": "array", "minItems": 1, "items": { "type": "string" } }
        }
    })
}

fn non_empty(stage: &'static str, field: &str, value: String) -> Result<String, StageError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StageError::invalid(stage, format!("`{}` is empty", field)));
    }
    Ok(trimmed.to_string())
}

fn non_empty_tags(stage: &'static str, field: &str, tags: Vec<String>) -> Result<Vec<String>, StageError> {
    let tags = dedup_tags(tags);
    if tags.is_empty() {
        return Err(StageError::invalid(stage, format!("`{}` has no usable entries", field)));
    }
    Ok(tags)
}

/// Seed → title and pitch
pub struct IdeaStage {
    ctx: StageContext,
}

impl IdeaStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for IdeaStage {
    type Input = Option<String>;
    type Output = Concept;

    fn name(&self) -> &'static str {
        "idea"
    }

    async fn invoke(&self, seed: &Option<String>) -> Result<Completion<Concept>, StageError> {
        debug!(?seed, "IdeaStage::invoke: called");
        let schema = json!({
            "type": "object",
            "required": ["title", "pitch"],
            "properties": {
                "title": { "type": "string", "minLength": 1 },
                "pitch": { "type": "string", "minLength": 1 }
            }
        });
        let options = CompleteOptions::default().with_temperature(0.9);
        let reply: Completion<Concept> = self
            .ctx
            .structured(self.name(), "idea", &json!({ "seed": seed }), &schema, &options)
            .await?;

        let usage = reply.usage;
        let concept = Concept {
            title: non_empty(self.name(), "title", reply.value.title)?,
            pitch: non_empty(self.name(), "pitch", reply.value.pitch)?,
        };
        info!(title = %concept.title, "IdeaStage::invoke: concept chosen");
        Ok(Completion { value: concept, usage })
    }
}

/// Title and pitch → core loop description
pub struct LoopClarifier {
    ctx: StageContext,
}

impl LoopClarifier {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct LoopReply {
    #[serde(rename = "loop")]
    game_loop: String,
}

#[async_trait]
impl Stage for LoopClarifier {
    type Input = Concept;
    type Output = String;

    fn name(&self) -> &'static str {
        "loop"
    }

    async fn invoke(&self, concept: &Concept) -> Result<Completion<String>, StageError> {
        debug!(title = %concept.title, "LoopClarifier::invoke: called");
        let reply: Completion<LoopReply> = self
            .ctx
            .structured(self.name(), "loop", concept, &string_field("loop"), &CompleteOptions::default())
            .await?;
        let usage = reply.usage;
        let game_loop = non_empty(self.name(), "loop", reply.value.game_loop)?;
        Ok(Completion { value: game_loop, usage })
    }
}

/// Draft → mechanic tags
pub struct MechanicExtractor {
    ctx: StageContext,
}

impl MechanicExtractor {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct MechanicsReply {
    mechanics: Vec<String>,
}

#[async_trait]
impl Stage for MechanicExtractor {
    type Input = DesignDraft;
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "mechanics"
    }

    async fn invoke(&self, draft: &DesignDraft) -> Result<Completion<Vec<String>>, StageError> {
        debug!(title = %draft.title, "MechanicExtractor::invoke: called");
        let reply: Completion<MechanicsReply> = self
            .ctx
            .structured(
                self.name(),
                "mechanics",
                draft,
                &list_field("mechanics"),
                &CompleteOptions::default(),
            )
            .await?;
        let usage = reply.usage;
        let mechanics: Vec<String> = reply.value.mechanics.into_iter().map(|m| m.to_lowercase()).collect();
        let mechanics = non_empty_tags(self.name(), "mechanics", mechanics)?;
        Ok(Completion { value: mechanics, usage })
    }
}

/// Draft → win/lose condition sentence
pub struct WinConditionBuilder {
    ctx: StageContext,
}

impl WinConditionBuilder {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WinReply {
    win_condition: String,
}

#[async_trait]
impl Stage for WinConditionBuilder {
    type Input = DesignDraft;
    type Output = String;

    fn name(&self) -> &'static str {
        "win-condition"
    }

    async fn invoke(&self, draft: &DesignDraft) -> Result<Completion<String>, StageError> {
        debug!(title = %draft.title, "WinConditionBuilder::invoke: called");
        let reply: Completion<WinReply> = self
            .ctx
            .structured(
                self.name(),
                "win",
                draft,
                &string_field("winCondition"),
                &CompleteOptions::default(),
            )
            .await?;
        let usage = reply.usage;
        let win = non_empty(self.name(), "winCondition", reply.value.win_condition)?;
        Ok(Completion { value: win, usage })
    }
}

/// Draft → on-screen entity kinds
pub struct EntityListBuilder {
    ctx: StageContext,
}

impl EntityListBuilder {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct EntitiesReply {
    entities: Vec<String>,
}

#[async_trait]
impl Stage for EntityListBuilder {
    type Input = DesignDraft;
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "entities"
    }

    async fn invoke(&self, draft: &DesignDraft) -> Result<Completion<Vec<String>>, StageError> {
        debug!(title = %draft.title, "EntityListBuilder::invoke: called");
        let reply: Completion<EntitiesReply> = self
            .ctx
            .structured(
                self.name(),
                "entities",
                draft,
                &list_field("entities"),
                &CompleteOptions::default(),
            )
            .await?;
        let usage = reply.usage;
        let entities = non_empty_tags(self.name(), "entities", reply.value.entities)?;
        Ok(Completion { value: entities, usage })
    }
}

/// Input to the final assembler
#[derive(Debug, Clone)]
pub struct AssemblyInput {
    pub draft: DesignDraft,
    pub playability: Playability,
}

/// Draft plus verdict → finished GameDefinition
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalAssembler;

#[async_trait]
impl Stage for FinalAssembler {
    type Input = AssemblyInput;
    type Output = GameDefinition;

    fn name(&self) -> &'static str {
        "assemble-design"
    }

    async fn invoke(&self, input: &AssemblyInput) -> Result<Completion<GameDefinition>, StageError> {
        debug!(title = %input.draft.title, "FinalAssembler::invoke: called");
        let mut definition = input.draft.to_definition();
        definition.playability = input.playability.clone();
        check_definition(self.name(), &definition)?;
        Ok(Completion {
            value: definition,
            usage: TokenUsage::default(),
        })
    }
}

fn check_definition(stage: &'static str, definition: &GameDefinition) -> Result<(), StageError> {
    let missing: Vec<&str> = [
        ("title", definition.title.is_empty()),
        ("description", definition.description.is_empty()),
        ("mechanics", definition.mechanics.is_empty()),
        ("winCondition", definition.win_condition.is_empty()),
        ("entities", definition.entities.is_empty()),
    ]
    .into_iter()
    .filter_map(|(field, empty)| empty.then_some(field))
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StageError::invalid(stage, format!("missing {}", missing.join(", "))))
    }
}

/// Unplayable definition plus suggestion
#[derive(Debug, Clone)]
pub struct AutoFixRequest {
    pub definition: GameDefinition,
    pub suggestion: String,
}

/// Rewrites an unplayable design as a complete replacement
pub struct AutoFix {
    ctx: StageContext,
}

impl AutoFix {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for AutoFix {
    type Input = AutoFixRequest;
    type Output = GameDefinition;

    fn name(&self) -> &'static str {
        "autofix"
    }

    async fn invoke(&self, request: &AutoFixRequest) -> Result<Completion<GameDefinition>, StageError> {
        debug!(title = %request.definition.title, suggestion = %request.suggestion, "AutoFix::invoke: called");
        let context = json!({
            "definition": request.definition.to_prompt_json(),
            "suggestion": request.suggestion,
        });
        let reply: Completion<GameDefinition> = self
            .ctx
            .structured(
                self.name(),
                "autofix",
                &context,
                &definition_schema(),
                &CompleteOptions::default(),
            )
            .await?;

        let usage = reply.usage;
        let mut definition = reply.value.normalized();
        // The heuristic decides, not the model
        definition.playability = Playability::Valid;
        check_definition(self.name(), &definition)?;
        info!(title = %definition.title, "AutoFix::invoke: replacement design received");
        Ok(Completion { value: definition, usage })
    }
}
