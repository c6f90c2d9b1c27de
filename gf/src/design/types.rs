//! Design and plan data types

use serde::{Deserialize, Serialize};

/// Result of the playability heuristic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Playability {
    Valid,
    Invalid(String),
}

impl Playability {
    pub fn is_valid(&self) -> bool {
        matches!(self, Playability::Valid)
    }
}

impl std::fmt::Display for Playability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Playability::Valid => write!(f, "valid"),
            Playability::Invalid(reason) => write!(f, "invalid: {}", reason),
        }
    }
}

/// A finished game design
///
/// Immutable once handed to the planner; AutoFix replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDefinition {
    pub title: String,
    pub description: String,
    /// Ordered, no duplicates
    pub mechanics: Vec<String>,
    pub win_condition: String,
    /// No duplicates
    pub entities: Vec<String>,
    #[serde(default = "default_playability")]
    pub playability: Playability,
}

fn default_playability() -> Playability {
    Playability::Valid
}

impl GameDefinition {
    /// Trim fields and drop duplicate mechanics and entities, keeping first occurrences
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.win_condition = self.win_condition.trim().to_string();
        self.mechanics = dedup_tags(self.mechanics);
        self.entities = dedup_tags(self.entities);
        self
    }

    /// The design without the playability verdict, for prompts
    pub fn to_prompt_json(&self) -> String {
        let value = serde_json::json!({
            "title": self.title,
            "description": self.description,
            "mechanics": self.mechanics,
            "winCondition": self.win_condition,
            "entities": self.entities,
        });
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

/// Trim, drop empties, and dedup case-insensitively preserving order
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

/// Title and pitch from the idea stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub title: String,
    pub pitch: String,
}

/// Design fields collected so far by the stage chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignDraft {
    pub title: String,
    pub pitch: String,
    #[serde(rename = "loop")]
    pub game_loop: String,
    pub mechanics: Vec<String>,
    pub win_condition: String,
    pub entities: Vec<String>,
}

impl DesignDraft {
    pub fn from_concept(concept: Concept) -> Self {
        Self {
            title: concept.title,
            pitch: concept.pitch,
            ..Self::default()
        }
    }

    /// A provisional definition for the playability check
    pub fn to_definition(&self) -> GameDefinition {
        let description = if self.game_loop.is_empty() {
            self.pitch.clone()
        } else {
            format!("{} {}", self.pitch.trim(), self.game_loop.trim())
        };
        GameDefinition {
            title: self.title.clone(),
            description,
            mechanics: self.mechanics.clone(),
            win_condition: self.win_condition.clone(),
            entities: self.entities.clone(),
            playability: Playability::Valid,
        }
        .normalized()
    }
}

/// One atomic build step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub id: u32,
    pub label: String,
}

impl BuildStep {
    pub fn new(id: u32, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    /// Sets up the canvas, context or initial state
    pub fn is_setup(&self) -> bool {
        let label = self.label.to_lowercase();
        SETUP_WORDS.iter().any(|w| label.contains(w))
    }

    /// Implements or displays the win/lose outcome
    pub fn is_win_lose(&self) -> bool {
        let label = self.label.to_lowercase();
        WIN_LOSE_WORDS.iter().any(|w| label.contains(w))
    }
}

const SETUP_WORDS: &[&str] = &[
    "set up",
    "setup",
    "initialize",
    "initialise",
    "environment",
    "canvas",
    "context",
];

const WIN_LOSE_WORDS: &[&str] = &["win", "lose", "game over", "victory", "defeat"];

/// Ordered build steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<BuildStep>,
}

impl Plan {
    pub fn new(steps: Vec<BuildStep>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check the setup-first, win/lose-last invariant and id ordering
    pub fn check(&self) -> Result<(), String> {
        let (Some(first), Some(last)) = (self.steps.first(), self.steps.last()) else {
            return Err("plan has no steps".to_string());
        };
        if !first.is_setup() {
            return Err(format!("first step is not environment setup: {}", first.label));
        }
        if !last.is_win_lose() {
            return Err(format!("last step does not implement win/lose: {}", last.label));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.id as usize != i + 1 {
                return Err(format!("step ids out of sequence at position {}: {}", i + 1, step.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> GameDefinition {
        GameDefinition {
            title: " Coin Dash ".to_string(),
            description: "Run and grab coins.".to_string(),
            mechanics: vec!["move".into(), "collect".into(), "Move".into(), " ".into()],
            win_condition: "Collect all coins.".to_string(),
            entities: vec!["player".into(), "coin".into(), "coin".into()],
            playability: Playability::Valid,
        }
    }

    #[test]
    fn test_normalized() {
        let def = definition().normalized();
        assert_eq!(def.title, "Coin Dash");
        assert_eq!(def.mechanics, vec!["move", "collect"]);
        assert_eq!(def.entities, vec!["player", "coin"]);
    }

    #[test]
    fn test_definition_json_shape() {
        let json = serde_json::to_value(definition()).unwrap();
        assert_eq!(json["winCondition"], "Collect all coins.");
        assert_eq!(json["playability"]["status"], "valid");

        let invalid = Playability::Invalid("no way to act".into());
        let json = serde_json::to_value(&invalid).unwrap();
        assert_eq!(json["status"], "invalid");
        assert_eq!(json["reason"], "no way to act");
    }

    #[test]
    fn test_definition_without_playability_deserializes() {
        let raw = r#"{"title":"t","description":"d","mechanics":["move"],"winCondition":"w","entities":["p"]}"#;
        let def: GameDefinition = serde_json::from_str(raw).unwrap();
        assert!(def.playability.is_valid());
    }

    #[test]
    fn test_prompt_json_omits_playability() {
        assert!(!definition().to_prompt_json().contains("playability"));
    }

    #[test]
    fn test_step_classification() {
        assert!(BuildStep::new(1, "Set up the canvas and game state").is_setup());
        assert!(BuildStep::new(9, "Show the win or lose message").is_win_lose());
        assert!(!BuildStep::new(3, "Add enemy movement").is_setup());
    }

    #[test]
    fn test_plan_check() {
        let plan = Plan::new(vec![
            BuildStep::new(1, "Initialize canvas"),
            BuildStep::new(2, "Move the player"),
            BuildStep::new(3, "Display win/lose screen"),
        ]);
        assert!(plan.check().is_ok());

        assert!(Plan::default().check().is_err());

        let bad = Plan::new(vec![BuildStep::new(1, "Move the player"), BuildStep::new(2, "Game over screen")]);
        assert!(bad.check().unwrap_err().contains("first step"));

        let misnumbered = Plan::new(vec![BuildStep::new(1, "Setup"), BuildStep::new(3, "Win screen")]);
        assert!(misnumbered.check().unwrap_err().contains("out of sequence"));
    }

    #[test]
    fn test_draft_to_definition() {
        let mut draft = DesignDraft::from_concept(Concept {
            title: "Coin Dash".into(),
            pitch: "Grab coins.".into(),
        });
        draft.game_loop = "Run around.".into();
        draft.mechanics = vec!["move".into()];
        let def = draft.to_definition();
        assert_eq!(def.description, "Grab coins. Run around.");
        assert_eq!(def.mechanics, vec!["move"]);
    }
}
