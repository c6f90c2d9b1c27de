//! Playability heuristic
//!
//! A cheap structural check, not a simulation: can the listed mechanics
//! plausibly move the player toward the stated win condition?

use async_trait::async_trait;
use tracing::debug;

use super::{GameDefinition, Playability, Stage, StageError};
use crate::llm::{Completion, TokenUsage};

/// Mechanics that never let the player act on the world
const PASSIVE: &[&str] = &["wait", "watch", "observe", "idle", "rest", "read", "listen", "think", "nothing"];

/// A family of win conditions and the mechanics that can achieve them
struct Goal {
    what: &'static str,
    win_words: &'static [&'static str],
    enablers: &'static [&'static str],
}

const MOVEMENT: &[&str] = &[
    "move", "run", "walk", "jump", "fly", "steer", "dash", "swim", "climb", "drive", "roll", "glide", "hop", "slide",
];

const GOALS: &[Goal] = &[
    Goal {
        what: "collecting",
        win_words: &["collect", "gather", "grab", "pick up", "coins", "gems"],
        enablers: &[
            "move", "run", "walk", "jump", "fly", "steer", "dash", "swim", "climb", "drive", "collect", "grab", "catch",
            "pick",
        ],
    },
    Goal {
        what: "reaching a place",
        win_words: &["reach", "escape", "arrive", "get to", "exit", "finish line", "cross"],
        enablers: MOVEMENT,
    },
    Goal {
        what: "defeating opponents",
        win_words: &["defeat", "destroy", "kill", "shoot", "eliminate", "clear all", "beat", "break all"],
        enablers: &[
            "shoot", "attack", "fire", "hit", "stomp", "jump", "bomb", "slash", "punch", "throw", "bounce", "paddle",
            "laser", "kick",
        ],
    },
    Goal {
        what: "surviving",
        win_words: &["survive", "outlast", "stay alive", "last for"],
        enablers: &[
            "dodge", "move", "run", "jump", "hide", "shield", "avoid", "fly", "steer", "dash", "block",
        ],
    },
];

fn matches_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Judge whether a design is playable
pub fn assess(definition: &GameDefinition) -> Playability {
    debug!(title = %definition.title, mechanics = ?definition.mechanics, "assess: called");
    if definition.mechanics.is_empty() {
        return Playability::Invalid("the design lists no mechanics".to_string());
    }
    let win = definition.win_condition.to_lowercase();
    if win.trim().is_empty() {
        return Playability::Invalid("the design has no win condition".to_string());
    }

    let mechanics: Vec<String> = definition.mechanics.iter().map(|m| m.to_lowercase()).collect();
    let active: Vec<&String> = mechanics
        .iter()
        .filter(|m| !PASSIVE.iter().any(|p| m.split_whitespace().all(|w| w == *p)))
        .collect();

    if active.is_empty() {
        return Playability::Invalid(format!(
            "the mechanics ({}) are all passive, so the player has no way to act toward the win condition \"{}\"; \
             add active mechanics such as moving, jumping or shooting",
            definition.mechanics.join(", "),
            definition.win_condition
        ));
    }

    for goal in GOALS {
        if !matches_any(&win, goal.win_words) {
            continue;
        }
        let enabled = active.iter().any(|m| matches_any(m, goal.enablers));
        if !enabled {
            return Playability::Invalid(format!(
                "winning requires {} but none of the mechanics ({}) enable it; add one of: {}",
                goal.what,
                definition.mechanics.join(", "),
                goal.enablers.iter().take(4).copied().collect::<Vec<_>>().join(", ")
            ));
        }
    }

    Playability::Valid
}

/// The heuristic as a chain stage
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayabilityHeuristic;

#[async_trait]
impl Stage for PlayabilityHeuristic {
    type Input = GameDefinition;
    type Output = Playability;

    fn name(&self) -> &'static str {
        "playability"
    }

    async fn invoke(&self, input: &GameDefinition) -> Result<Completion<Playability>, StageError> {
        Ok(Completion {
            value: assess(input),
            usage: TokenUsage::default(),
        })
    }
}
