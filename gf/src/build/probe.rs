//! Whole-program checks run after the last build step

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::source::{ItemKind, Token, TokenKind, parse_program};

/// Zero-argument functions accepted as the program entry point
const ENTRY_POINTS: &[&str] = &["init", "start", "startGame", "main", "gameLoop", "loop", "run", "setup"];

/// Words that open a statement without being a callee
const STATEMENT_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "return", "throw", "try", "new", "typeof", "void", "delete", "await",
];

/// `init()`, `requestAnimationFrame(loop)` or `window.onload = init`
fn starts_game(tokens: &[Token]) -> bool {
    let tokens = match tokens.last() {
        Some(last) if last.text == ";" => &tokens[..tokens.len() - 1],
        _ => tokens,
    };
    let is_name = |tok: &Token| tok.kind == TokenKind::Ident && !STATEMENT_KEYWORDS.contains(&tok.text.as_str());

    // Member chain: name (`.` name)*
    let mut i = 0;
    let mut members = 0;
    loop {
        match tokens.get(i) {
            Some(tok) if is_name(tok) => i += 1,
            _ => return false,
        }
        match tokens.get(i) {
            Some(tok) if tok.text == "." => {
                members += 1;
                i += 1;
            }
            _ => break,
        }
    }

    match tokens.get(i).map(|tok| tok.text.as_str()) {
        Some("(") => true,
        // Handler assignment: the right-hand side names a function or is one
        Some("=") if members > 0 => match &tokens[i + 1..] {
            [handler] => is_name(handler),
            [head, ..] => head.text == "function" || tokens[i + 1..].iter().any(|tok| tok.text == "=>"),
            [] => false,
        },
        _ => false,
    }
}

/// Can the program be parsed and started with nothing bound?
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanityReport {
    pub parses: bool,
    /// What starts the game: a top-level call or a zero-argument entry function
    pub entry_point: Option<String>,
    pub problems: Vec<String>,
}

impl SanityReport {
    pub fn ok(&self) -> bool {
        self.parses && self.entry_point.is_some()
    }
}

/// Static sanity check over the final program
pub fn static_sanity(code: &str) -> SanityReport {
    debug!(len = code.len(), "static_sanity: called");
    let program = match parse_program(code) {
        Ok(program) => program,
        Err(e) => {
            return SanityReport {
                parses: false,
                entry_point: None,
                problems: vec![format!("program does not parse: {}", e)],
            };
        }
    };

    // A top-level call kicks the game off by itself
    let top_level_call = program.items.iter().find_map(|item| match item.kind {
        ItemKind::Statement if starts_game(&program.tokens[item.stmt.range.clone()]) => {
            Some(item.stmt.normalized.clone())
        }
        _ => None,
    });

    let entry_function = program.items.iter().find_map(|item| match &item.kind {
        ItemKind::Function(f) if f.param_count == 0 && ENTRY_POINTS.contains(&f.name.as_str()) => Some(f.name.clone()),
        _ => None,
    });

    let entry_point = top_level_call.or(entry_function);
    let mut problems = Vec::new();
    if entry_point.is_none() {
        problems.push("nothing starts the game: no top-level call and no zero-argument init/start function".to_string());
    }

    SanityReport {
        parses: true,
        entry_point,
        problems,
    }
}

/// What a run of the game exhibited
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub render_surface: bool,
    pub responsive_input: bool,
    pub player_movement: bool,
    pub win_reachable: bool,
    pub notes: Vec<String>,
}

impl ProbeReport {
    pub fn playable(&self) -> bool {
        self.render_surface && self.responsive_input && self.player_movement && self.win_reachable
    }
}

/// Runtime playability check
///
/// The default implementation inspects source text; a headless browser runner
/// can implement the same trait.
#[async_trait]
pub trait PlayabilityProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self, code: &str) -> ProbeReport;
}

/// Source-level stand-in for a headless run
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProbe;

struct Signals {
    context: Regex,
    drawing: Regex,
    frames: Regex,
    input: Regex,
    movement: Regex,
    outcome: Regex,
}

static SIGNALS: LazyLock<Signals> = LazyLock::new(|| Signals {
    context: Regex::new(r"getContext\s*\(").expect("valid regex"),
    drawing: Regex::new(r"\.(?:fillRect|strokeRect|drawImage|arc|fill|stroke|fillText)\s*\(").expect("valid regex"),
    frames: Regex::new(r"\b(?:requestAnimationFrame|setInterval)\s*\(").expect("valid regex"),
    input: Regex::new(r"\bcontrols\s*(?:\.\s*\w+|\[)").expect("valid regex"),
    movement: Regex::new(r"\.\s*(?:x|y|vx|vy|dx|dy)\s*(?:[+\-*]=|=[^=])|\b(?:x|y)\s*[+\-]=").expect("valid regex"),
    outcome: Regex::new(r"(?i)\b(?:win|won|victory|you\s+win|game\s*over|lose|lost)\b").expect("valid regex"),
});

#[async_trait]
impl PlayabilityProbe for StaticProbe {
    fn name(&self) -> &str {
        "static"
    }

    async fn probe(&self, code: &str) -> ProbeReport {
        debug!(len = code.len(), "StaticProbe::probe: called");
        let signals = &*SIGNALS;
        let mut report = ProbeReport {
            render_surface: signals.context.is_match(code)
                && signals.drawing.is_match(code)
                && signals.frames.is_match(code),
            responsive_input: signals.input.is_match(code),
            player_movement: signals.movement.is_match(code),
            win_reachable: signals.outcome.is_match(code),
            notes: Vec::new(),
        };

        if !report.render_surface {
            report
                .notes
                .push("no active render loop drawing on the canvas context".to_string());
        }
        if !report.responsive_input {
            report.notes.push("input is never read from `controls`".to_string());
        }
        if !report.player_movement {
            report.notes.push("no position is ever updated".to_string());
        }
        if !report.win_reachable {
            report.notes.push("no win or lose state found".to_string());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME: &str = r#"
const canvas = document.getElementById('gameCanvas');
const ctx = canvas.getContext('2d');
let player = { x: 10, y: 10 };
let won = false;
function update() {
    if (controls.right) player.x += 2;
    if (player.x > 300) won = true;
}
function draw() {
    ctx.fillRect(player.x, player.y, 8, 8);
    if (won) ctx.fillText('You win!', 100, 100);
}
function gameLoop() {
    update();
    draw();
    requestAnimationFrame(gameLoop);
}
gameLoop();
"#;

    #[test]
    fn test_sanity_with_top_level_start() {
        let report = static_sanity(GAME);
        assert!(report.ok());
        assert_eq!(report.entry_point.as_deref(), Some("gameLoop ( )"));
    }

    #[test]
    fn test_sanity_with_entry_function_only() {
        let report = static_sanity("function init() {\n    draw();\n}\nfunction draw() {}");
        assert!(report.ok());
        assert_eq!(report.entry_point.as_deref(), Some("init"));
    }

    #[test]
    fn test_sanity_without_entry_point() {
        let report = static_sanity("function update(dt) {}\nlet x = 1;");
        assert!(report.parses);
        assert!(!report.ok());
        assert_eq!(report.problems.len(), 1);
    }

    #[test]
    fn test_control_flow_is_not_an_entry_point() {
        let report = static_sanity("let debug = false;\nif (debug) {\n    console.log('x');\n}\nfunction update(dt) {}");
        assert!(report.parses);
        assert!(!report.ok());
        assert_eq!(report.entry_point, None);

        let report = static_sanity("let w = 0;\nw = Math.floor(3);\nfor (let i = 0; i < 3; i++) {}\nwhile (false) {}");
        assert!(!report.ok());
    }

    #[test]
    fn test_call_and_handler_entry_points() {
        let report = static_sanity("function loop(t) {}\nrequestAnimationFrame(loop);");
        assert_eq!(report.entry_point.as_deref(), Some("requestAnimationFrame ( loop )"));

        let report = static_sanity("function boot() {}\nwindow.onload = boot;");
        assert_eq!(report.entry_point.as_deref(), Some("window . onload = boot"));

        let report = static_sanity("window.addEventListener('load', () => {});");
        assert!(report.ok());

        let report = static_sanity("let handler = null;\nwindow.onload = handler.bind;");
        assert!(!report.ok());
    }

    #[test]
    fn test_sanity_parse_failure() {
        let report = static_sanity("function (");
        assert!(!report.parses);
        assert!(!report.ok());
    }

    #[tokio::test]
    async fn test_static_probe_playable_game() {
        let report = StaticProbe.probe(GAME).await;
        assert!(report.playable(), "{:?}", report.notes);
    }

    #[tokio::test]
    async fn test_static_probe_without_input() {
        let code = GAME.replace("controls.right", "true");
        let report = StaticProbe.probe(&code).await;
        assert!(!report.responsive_input);
        assert!(!report.playable());
        assert_eq!(report.notes.len(), 1);
    }
}
