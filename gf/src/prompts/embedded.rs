//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

pub const IDEA: &str = include_str!("../../prompts/idea.pmt");
pub const LOOP: &str = include_str!("../../prompts/loop.pmt");
pub const MECHANICS: &str = include_str!("../../prompts/mechanics.pmt");
pub const WIN: &str = include_str!("../../prompts/win.pmt");
pub const ENTITIES: &str = include_str!("../../prompts/entities.pmt");
pub const AUTOFIX: &str = include_str!("../../prompts/autofix.pmt");
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");
pub const STEP: &str = include_str!("../../prompts/step.pmt");
pub const REPAIR: &str = include_str!("../../prompts/repair.pmt");

/// Names of every embedded template
pub const NAMES: &[&str] = &[
    "idea",
    "loop",
    "mechanics",
    "win",
    "entities",
    "autofix",
    "plan",
    "step",
    "repair",
];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let template = match name {
        "idea" => IDEA,
        "loop" => LOOP,
        "mechanics" => MECHANICS,
        "win" => WIN,
        "entities" => ENTITIES,
        "autofix" => AUTOFIX,
        "plan" => PLAN,
        "step" => STEP,
        "repair" => REPAIR,
        _ => {
            debug!("get_embedded: no match found");
            return None;
        }
    };
    Some(template)
}
