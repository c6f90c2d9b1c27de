//! Script source handling
//!
//! A lightweight lexer and top-level parser for the browser scripts the
//! pipeline generates. It understands enough of the language to split
//! statements, find declarations and walk identifiers; it is not a full
//! parser and never evaluates anything.

use thiserror::Error;

mod lexer;
mod syntax;

pub use lexer::{Token, TokenKind, tokenize};
pub use syntax::{
    Declarator, FunctionDecl, Item, ItemKind, Program, Stmt, VarDecl, match_brackets, parse_program, pattern_names,
    reindent, split_statements,
};

/// A syntax problem with the line it was found on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct SourceError {
    pub message: String,
    pub line: usize,
}

impl SourceError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

/// Reserved words and literals that can never be used as binding names
pub const RESERVED: &[&str] = &[
    "await",
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "import",
    "in",
    "instanceof",
    "let",
    "new",
    "null",
    "return",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "yield",
];

/// Contextual words that read like identifiers but are never references
pub const CONTEXTUAL: &[&str] = &["of", "async", "get", "set", "static", "undefined", "arguments", "NaN", "Infinity"];

pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}
