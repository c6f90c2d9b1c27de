//! Declaration-aware merging of code fragments
//!
//! Each build step produces a fragment that usually adds a function or extends
//! one that already exists (`update`, `draw`, ...). Concatenating fragments
//! would leave duplicate top-level declarations, so fragments are folded into
//! the accumulated program declaration by declaration:
//!
//! - functions declared on both sides get their bodies merged statement by
//!   statement, skipping statements already present
//! - variables declared on both sides keep the fragment's declarator
//! - any other clash is resolved in favour of the fragment
//! - loose top-level statements are appended once
//!
//! When either side cannot be parsed the merge degrades to plain
//! concatenation and reports why.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, warn};

use crate::source::{FunctionDecl, Item, ItemKind, SourceError, Stmt, parse_program, reindent};

const BODY_INDENT: &str = "    ";

/// Result of folding a fragment into the accumulated program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub code: String,
    /// Set when the declaration-aware merge was abandoned for concatenation
    pub fallback: Option<String>,
}

impl MergeOutcome {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("cannot parse {which}: {source}")]
    Parse {
        which: &'static str,
        #[source]
        source: SourceError,
    },

    #[error("`{0}` maps to more than one existing declaration")]
    AmbiguousBinding(String),

    #[error("redeclaring `{name}` would drop `{dropped}` bound by the same declaration")]
    DroppedBinding { name: String, dropped: String },

    #[error("merged program does not parse: {0}")]
    Output(SourceError),
}

/// Merge `fragment` into `accumulated`
///
/// Never fails: on any merge error the two inputs are concatenated and the
/// reason is recorded in [`MergeOutcome::fallback`].
pub fn merge(accumulated: &str, fragment: &str) -> MergeOutcome {
    debug!(accumulated = accumulated.len(), fragment = fragment.len(), "merge: called");
    match try_merge(accumulated, fragment) {
        Ok(code) => MergeOutcome { code, fallback: None },
        Err(e) => {
            warn!(error = %e, "merge: falling back to concatenation");
            MergeOutcome {
                code: concat(accumulated, fragment),
                fallback: Some(e.to_string()),
            }
        }
    }
}

/// Declaration-aware merge without the fallback
pub fn try_merge(accumulated: &str, fragment: &str) -> Result<String, MergeError> {
    let acc = parse_program(accumulated).map_err(|source| MergeError::Parse {
        which: "accumulated program",
        source,
    })?;
    let frag = parse_program(fragment).map_err(|source| MergeError::Parse {
        which: "fragment",
        source,
    })?;

    let mut program = MergedProgram::default();
    for item in acc.items.into_iter().chain(frag.items) {
        program.absorb(item)?;
    }

    let code = program.render();
    parse_program(&code).map_err(MergeError::Output)?;
    debug!(
        declarations = program.decls.len(),
        statements = program.statements.len(),
        "try_merge: merged"
    );
    Ok(code)
}

fn concat(accumulated: &str, fragment: &str) -> String {
    if accumulated.is_empty() {
        fragment.to_string()
    } else {
        format!("{}\n{}", accumulated, fragment)
    }
}

/// A top-level declaration in the merged output
#[derive(Debug, Clone)]
enum Decl {
    Function(MergedFunction),
    Variable { keyword: String, text: String },
    /// Classes and anything else kept verbatim
    Verbatim(String),
}

#[derive(Debug, Clone)]
struct MergedFunction {
    header: String,
    param_count: usize,
    body: Vec<BodyStmt>,
    /// Untouched source, rendered as-is while nothing has changed
    original: Option<String>,
}

#[derive(Debug, Clone)]
struct BodyStmt {
    normalized: String,
    text: String,
    is_return: bool,
}

impl From<&Stmt> for BodyStmt {
    fn from(stmt: &Stmt) -> Self {
        Self {
            normalized: stmt.normalized.clone(),
            text: stmt.reindented(BODY_INDENT),
            is_return: stmt.is_return(),
        }
    }
}

impl MergedFunction {
    fn new(decl: &FunctionDecl, stmt: &Stmt) -> Self {
        Self {
            header: decl.header.clone(),
            param_count: decl.param_count,
            body: decl.body.iter().map(BodyStmt::from).collect(),
            original: Some(stmt.reindented("")),
        }
    }

    /// Fold another declaration of the same function into this one
    fn absorb(&mut self, decl: &FunctionDecl) {
        debug!(name = %decl.name, "absorb: merging function bodies");
        let mut changed = false;

        if decl.param_count > self.param_count {
            self.header = decl.header.clone();
            self.param_count = decl.param_count;
            changed = true;
        }

        let (mut statements, mut final_return) = split_final_return(std::mem::take(&mut self.body));
        let (incoming, incoming_return) = split_final_return(decl.body.iter().map(BodyStmt::from).collect());

        let mut seen: HashSet<String> = statements.iter().map(|s| s.normalized.clone()).collect();
        for stmt in incoming {
            if seen.insert(stmt.normalized.clone()) {
                statements.push(stmt);
                changed = true;
            }
        }

        if let Some(ret) = incoming_return {
            if final_return.as_ref().is_none_or(|existing| existing.normalized != ret.normalized) {
                changed = true;
            }
            final_return = Some(ret);
        }

        statements.extend(final_return);
        self.body = statements;
        if changed {
            self.original = None;
        }
    }

    fn render(&self) -> String {
        if let Some(original) = &self.original {
            return original.clone();
        }
        if self.body.is_empty() {
            return format!("{} {{}}", self.header);
        }
        let body: Vec<&str> = self.body.iter().map(|s| s.text.as_str()).collect();
        format!("{} {{\n{}\n}}", self.header, body.join("\n"))
    }
}

/// Separate the last unconditional `return` from the rest of a body
///
/// Earlier unconditional returns are dropped; they would make anything
/// appended after them unreachable.
fn split_final_return(body: Vec<BodyStmt>) -> (Vec<BodyStmt>, Option<BodyStmt>) {
    let mut statements = Vec::with_capacity(body.len());
    let mut final_return = None;
    for stmt in body {
        if stmt.is_return {
            final_return = Some(stmt);
        } else {
            statements.push(stmt);
        }
    }
    (statements, final_return)
}

impl Decl {
    fn render(&self) -> String {
        match self {
            Decl::Function(f) => f.render(),
            Decl::Variable { keyword, text } => format!("{} {};", keyword, text),
            Decl::Verbatim(text) => text.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct MergedProgram {
    decls: Vec<Decl>,
    index: HashMap<String, usize>,
    statements: Vec<String>,
    seen_statements: HashSet<String>,
}

impl MergedProgram {
    fn absorb(&mut self, item: Item) -> Result<(), MergeError> {
        match &item.kind {
            ItemKind::Function(decl) => {
                let slot = self.slot_for(std::slice::from_ref(&decl.name))?;
                match slot.map(|i| &mut self.decls[i]) {
                    Some(Decl::Function(existing)) => existing.absorb(decl),
                    Some(other) => *other = Decl::Function(MergedFunction::new(decl, &item.stmt)),
                    None => self.push(&[decl.name.clone()], Decl::Function(MergedFunction::new(decl, &item.stmt))),
                }
            }
            ItemKind::Variable(var) => {
                let column = item.stmt.column;
                for declarator in &var.declarators {
                    let text = reindent(&declarator.text, column, "");
                    let slot = self.slot_for(&declarator.names)?;
                    match slot.map(|i| &mut self.decls[i]) {
                        Some(Decl::Variable { keyword, text: existing }) => {
                            if *keyword != var.keyword {
                                *keyword = "let".to_string();
                            }
                            *existing = text;
                        }
                        Some(other) => {
                            *other = Decl::Variable {
                                keyword: var.keyword.clone(),
                                text,
                            }
                        }
                        None => self.push(
                            &declarator.names,
                            Decl::Variable {
                                keyword: var.keyword.clone(),
                                text,
                            },
                        ),
                    }
                    if let Some(i) = slot {
                        self.bind(&declarator.names, i);
                    }
                }
            }
            ItemKind::Class { name } => {
                let decl = Decl::Verbatim(item.stmt.reindented(""));
                match self.slot_for(std::slice::from_ref(name))? {
                    Some(i) => self.decls[i] = decl,
                    None => self.push(std::slice::from_ref(name), decl),
                }
            }
            ItemKind::Statement => {
                if self.seen_statements.insert(item.stmt.normalized.clone()) {
                    self.statements.push(item.stmt.reindented(""));
                }
            }
        }
        Ok(())
    }

    /// The existing declaration any of `names` refers to
    ///
    /// The slot is only handed out when `names` covers every name it binds;
    /// replacing `const { x, y }` with `let x` would silently lose `y`.
    fn slot_for(&self, names: &[String]) -> Result<Option<usize>, MergeError> {
        let mut slot = None;
        for name in names {
            if let Some(&i) = self.index.get(name) {
                match slot {
                    Some(existing) if existing != i => return Err(MergeError::AmbiguousBinding(name.clone())),
                    _ => slot = Some(i),
                }
            }
        }

        if let Some(i) = slot {
            let mut dropped: Vec<&String> = self
                .index
                .iter()
                .filter(|(bound, slot)| **slot == i && !names.contains(bound))
                .map(|(bound, _)| bound)
                .collect();
            dropped.sort();
            if let Some(dropped) = dropped.first() {
                return Err(MergeError::DroppedBinding {
                    name: names.iter().find(|n| self.index.contains_key(*n)).cloned().unwrap_or_default(),
                    dropped: (*dropped).clone(),
                });
            }
        }
        Ok(slot)
    }

    fn push(&mut self, names: &[String], decl: Decl) {
        self.decls.push(decl);
        self.bind(names, self.decls.len() - 1);
    }

    fn bind(&mut self, names: &[String], slot: usize) {
        for name in names {
            self.index.insert(name.clone(), slot);
        }
    }

    fn render(&self) -> String {
        let blocks: Vec<String> = self
            .decls
            .iter()
            .map(Decl::render)
            .chain(self.statements.iter().cloned())
            .collect();

        let mut out = String::new();
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                let spaced = block.contains('\n') || blocks[i - 1].contains('\n');
                out.push_str(if spaced { "\n\n" } else { "\n" });
            }
            out.push_str(block);
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}
