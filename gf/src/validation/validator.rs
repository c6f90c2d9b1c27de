//! Scope-aware static validator
//!
//! A token-level scanner, not a type checker. Scopes are modelled as the global
//! scope plus one flat scope per top-level statement, which covers a function
//! body together with any callbacks nested inside it. Dynamic patterns may slip
//! through; allow-listed host globals are never reported.

use std::collections::HashSet;
use std::ops::Range;

use tracing::debug;

use super::Diagnostic;
use crate::source::{CONTEXTUAL, Token, TokenKind, is_reserved, parse_program, pattern_names};

/// Globals the browser host and the game platform provide
pub const HOST_GLOBALS: &[&str] = &[
    "window",
    "document",
    "console",
    "Math",
    "requestAnimationFrame",
    "cancelAnimationFrame",
    "setTimeout",
    "setInterval",
    "clearTimeout",
    "clearInterval",
    "performance",
    "Date",
    "JSON",
    "Image",
    "Audio",
    "AudioContext",
    "Array",
    "Object",
    "String",
    "Number",
    "Boolean",
    "Symbol",
    "Error",
    "RegExp",
    "Map",
    "Set",
    "WeakMap",
    "Promise",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "localStorage",
    "navigator",
    "globalThis",
    "Float32Array",
    "Uint8Array",
    "Path2D",
    "canvas",
    "ctx",
    "controls",
];

/// Static checks over a whole program
///
/// Kept behind a trait so the scanner can be swapped for a real parser
/// without touching callers.
pub trait CodeValidator: Send + Sync {
    fn name(&self) -> &str;

    /// Empty when the program is clean
    fn validate(&self, code: &str) -> Vec<Diagnostic>;
}

#[derive(Debug, Clone)]
pub struct ScopeValidator {
    globals: HashSet<String>,
}

impl Default for ScopeValidator {
    fn default() -> Self {
        Self {
            globals: HOST_GLOBALS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ScopeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow extra host globals on top of the defaults
    pub fn with_globals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.globals.extend(names.into_iter().map(Into::into));
        self
    }
}

impl CodeValidator for ScopeValidator {
    fn name(&self) -> &str {
        "scope"
    }

    fn validate(&self, code: &str) -> Vec<Diagnostic> {
        debug!(len = code.len(), "ScopeValidator::validate: called");
        let program = match parse_program(code) {
            Ok(program) => program,
            Err(e) => {
                debug!(error = %e, "ScopeValidator::validate: syntax error");
                return vec![Diagnostic::syntax_error(e.message, e.line)];
            }
        };

        let mut diagnostics = Vec::new();
        let mut top_level: HashSet<String> = HashSet::new();
        for item in &program.items {
            for name in item.declared_names() {
                if !top_level.insert(name.clone()) {
                    diagnostics.push(Diagnostic::duplicate_declaration(&name, item.stmt.line));
                }
            }
        }

        let mut reported: HashSet<String> = HashSet::new();
        for item in &program.items {
            let range = item.stmt.range.clone();
            let locals = collect_locals(&program.tokens, &program.partners, range.clone());
            for (name, line) in references(&program.tokens, &program.partners, range) {
                let known = top_level.contains(name) || locals.contains(name) || self.globals.contains(name);
                if !known && reported.insert(name.to_string()) {
                    diagnostics.push(Diagnostic::undeclared_identifier(name, line));
                }
            }
        }

        debug!(count = diagnostics.len(), "ScopeValidator::validate: done");
        diagnostics
    }
}

fn is_keyword_like(word: &str) -> bool {
    is_reserved(word) || CONTEXTUAL.contains(&word)
}

fn is_control_keyword(tok: &Token) -> bool {
    tok.is_ident() && matches!(tok.text.as_str(), "if" | "for" | "while" | "switch" | "with")
}

/// Every name bound anywhere inside `range`: declarations, parameters, catch bindings
fn collect_locals(tokens: &[Token], partners: &[Option<usize>], range: Range<usize>) -> HashSet<String> {
    let mut locals = HashSet::new();
    for i in range.clone() {
        let tok = &tokens[i];
        if tok.is_ident() {
            match tok.text.as_str() {
                "var" | "let" | "const" => declarator_names(tokens, partners, i + 1, range.end, &mut locals),
                "function" | "class" => {
                    if let Some(name) = tokens
                        .get(i + 1)
                        .filter(|t| i + 1 < range.end && t.is_ident() && !is_keyword_like(&t.text))
                    {
                        locals.insert(name.text.clone());
                    }
                }
                _ => {}
            }
        }

        // Parameter lists: `(...) {` for functions, methods and catch, `(...) =>` for arrows
        if tok.is_punct("(")
            && let Some(close) = partners[i]
        {
            let after = tokens.get(close + 1);
            let arrow = after.is_some_and(|t| t.is_punct("=>"));
            let body = after.is_some_and(|t| t.is_punct("{")) && !(i > 0 && is_control_keyword(&tokens[i - 1]));
            if arrow || body {
                locals.extend(pattern_names(tokens, partners, i + 1, close));
            }
        }

        if tok.is_punct("=>") && i > range.start && tokens[i - 1].is_ident() {
            locals.insert(tokens[i - 1].text.clone());
        }
    }
    locals
}

/// Names bound by the declarator list that starts at `start`
fn declarator_names(tokens: &[Token], partners: &[Option<usize>], start: usize, end: usize, out: &mut HashSet<String>) {
    let mut i = start;
    let mut expect_binding = true;
    while i < end {
        let tok = &tokens[i];
        if i > start && tok.newline_before && !expect_binding {
            let prev = &tokens[i - 1];
            if !prev.is_punct(",") && !prev.is_punct("=") {
                break;
            }
        }
        if expect_binding {
            expect_binding = false;
            if tok.is_ident() && !is_keyword_like(&tok.text) {
                out.insert(tok.text.clone());
            } else if (tok.is_punct("{") || tok.is_punct("["))
                && let Some(close) = partners[i]
            {
                out.extend(pattern_names(tokens, partners, i + 1, close));
                i = close + 1;
                continue;
            }
        } else if tok.is_punct(",") {
            expect_binding = true;
        } else if tok.is_punct(";") || matches!(tok.text.as_str(), ")" | "]" | "}") && tok.kind == TokenKind::Punct {
            break;
        } else if let Some(close) = partners[i].filter(|&c| c > i) {
            i = close;
        }
        i += 1;
    }
}

/// Identifier references inside `range`, with their lines
fn references<'a>(
    tokens: &'a [Token],
    partners: &[Option<usize>],
    range: Range<usize>,
) -> impl Iterator<Item = (&'a str, usize)> {
    let method_names: HashSet<usize> = range
        .clone()
        .filter(|&i| {
            tokens[i].is_ident()
                && tokens.get(i + 1).is_some_and(|t| t.is_punct("("))
                && partners[i + 1].is_some_and(|close| tokens.get(close + 1).is_some_and(|t| t.is_punct("{")))
        })
        .collect();

    range.filter_map(move |i| {
        let tok = &tokens[i];
        if !tok.is_ident() || is_keyword_like(&tok.text) || method_names.contains(&i) {
            return None;
        }
        if let Some(prev) = i.checked_sub(1).map(|p| &tokens[p]) {
            if prev.is_punct(".") || prev.is_punct("?.") {
                return None;
            }
            if prev.is_ident() && matches!(prev.text.as_str(), "typeof" | "break" | "continue" | "function" | "class") {
                return None;
            }
            let object_key = (prev.is_punct("{") || prev.is_punct(","))
                && tokens.get(i + 1).is_some_and(|next| next.is_punct(":"));
            if object_key {
                return None;
            }
        }
        Some((tok.text.as_str(), tok.line))
    })
}
