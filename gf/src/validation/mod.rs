//! Code validation
//!
//! Two independent checks run over generated programs:
//! - [`ScopeValidator`] finds syntax errors, duplicate top-level declarations
//!   and undeclared identifiers
//! - [`check`] enforces the fixed platform rule policy
//!
//! Both report [`Diagnostic`]s, which drive the repair step.

use std::fmt;

use serde::{Deserialize, Serialize};

mod compliance;
mod validator;

pub use compliance::{ComplianceReport, POLICY_VERSION, RuleViolation, check, policy};
pub use validator::{CodeValidator, HOST_GLOBALS, ScopeValidator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    SyntaxError,
    DuplicateDeclaration,
    UndeclaredIdentifier,
    RuleViolation,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::SyntaxError => "syntax_error",
            DiagnosticKind::DuplicateDeclaration => "duplicate_declaration",
            DiagnosticKind::UndeclaredIdentifier => "undeclared_identifier",
            DiagnosticKind::RuleViolation => "rule_violation",
        };
        write!(f, "{}", s)
    }
}

/// A single problem found in a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }

    pub fn syntax_error(message: impl Into<String>, line: usize) -> Self {
        Self::new(DiagnosticKind::SyntaxError, message, Some(line))
    }

    pub fn duplicate_declaration(name: &str, line: usize) -> Self {
        Self::new(
            DiagnosticKind::DuplicateDeclaration,
            format!("`{}` is declared more than once at top level", name),
            Some(line),
        )
    }

    pub fn undeclared_identifier(name: &str, line: usize) -> Self {
        Self::new(
            DiagnosticKind::UndeclaredIdentifier,
            format!("`{}` is used but never declared", name),
            Some(line),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}] line {}: {}", self.kind, line, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// One diagnostic per line, for prompts and terminal output
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("- {}", d))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&DiagnosticKind::UndeclaredIdentifier).unwrap();
        assert_eq!(json, "\"undeclared_identifier\"");
        assert_eq!(DiagnosticKind::SyntaxError.to_string(), "syntax_error");
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::undeclared_identifier("score", 4);
        assert_eq!(d.to_string(), "[undeclared_identifier] line 4: `score` is used but never declared");
        let d = Diagnostic::new(DiagnosticKind::RuleViolation, "needs text", None);
        assert_eq!(d.to_string(), "[rule_violation] needs text");
    }

    #[test]
    fn test_line_omitted_when_absent() {
        let d = Diagnostic::new(DiagnosticKind::RuleViolation, "x", None);
        let json = serde_json::to_value(&d).unwrap();
        assert!(json.get("line").is_none());
    }

    #[test]
    fn test_format_diagnostics() {
        let text = format_diagnostics(&[
            Diagnostic::syntax_error("unexpected `}`", 3),
            Diagnostic::duplicate_declaration("update", 9),
        ]);
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("- [syntax_error] line 3"));
    }
}
