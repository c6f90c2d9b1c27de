//! Platform rule compliance
//!
//! Generated games run inside a host page that owns the canvas, the text
//! overlay and the input abstraction. The rules below are a fixed, versioned
//! policy; changing them means shipping a new `POLICY_VERSION`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Diagnostic, DiagnosticKind};

pub const POLICY_VERSION: u32 = 1;

/// How a rule's pattern is applied
enum Expectation {
    /// No line may match
    Forbidden,
    /// At least one line must match
    AtLeastOne,
    /// Exactly one line must match
    ExactlyOne,
}

struct Rule {
    name: &'static str,
    description: &'static str,
    expectation: Expectation,
    pattern: Regex,
}

fn rule(name: &'static str, description: &'static str, expectation: Expectation, pattern: &str) -> Rule {
    Rule {
        name,
        description,
        expectation,
        pattern: Regex::new(pattern).expect("policy patterns are valid regexes"),
    }
}

static POLICY: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            "no-blocking-dialogs",
            "Do not call alert, confirm or prompt",
            Expectation::Forbidden,
            r"(?:^|[^.\w$])(?:window\.)?(?:alert|confirm|prompt)\s*\(",
        ),
        rule(
            "no-dom-injection",
            "Do not inject DOM content (innerHTML, document.write, appendChild, ...)",
            Expectation::Forbidden,
            r"\.(?:inner|outer)HTML\s*\+?=(?:[^=]|$)|document\.write(?:ln)?\s*\(|\.insertAdjacentHTML\s*\(|\.appendChild\s*\(|\.insertBefore\s*\(",
        ),
        rule(
            "single-render-surface",
            "Draw only on the provided canvas; never create another one",
            Expectation::Forbidden,
            r#"createElement\s*\(\s*['"`]canvas['"`]\s*\)|new\s+OffscreenCanvas\b"#,
        ),
        rule(
            "requires-text-drawing",
            "Draw score and status text on the canvas with fillText or strokeText",
            Expectation::AtLeastOne,
            r"\.(?:fillText|strokeText)\s*\(",
        ),
        rule(
            "single-surface-lookup",
            "Look up the canvas exactly once with document.getElementById('gameCanvas')",
            Expectation::ExactlyOne,
            r#"getElementById\s*\(\s*['"`]gameCanvas['"`]\s*\)"#,
        ),
        rule(
            "no-raw-keyboard",
            "Read input only through the `controls` object; no keyboard listeners or key codes",
            Expectation::Forbidden,
            r#"addEventListener\s*\(\s*['"`]key(?:down|up|press)['"`]|\bonkey(?:down|up|press)\b|\.(?:keyCode|which|charCode)\b|\b(?:e|ev|evt|event|keyEvent)\.(?:key|code)\b"#,
        ),
    ]
});

/// Rule names and descriptions in policy order
pub fn policy() -> impl Iterator<Item = (&'static str, &'static str)> {
    POLICY.iter().map(|r| (r.name, r.description))
}

/// A violated rule with its offending lines (`"<n>: <trimmed text>"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub compliant: bool,
    pub violations: Vec<RuleViolation>,
}

impl ComplianceReport {
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        self.violations
            .iter()
            .map(|v| {
                let line = v.lines.first().and_then(|l| l.split(':').next()).and_then(|n| n.parse().ok());
                let message = if v.lines.is_empty() {
                    format!("{}: {}", v.rule, describe(&v.rule))
                } else {
                    format!("{}: {} ({})", v.rule, describe(&v.rule), v.lines.join("; "))
                };
                Diagnostic::new(DiagnosticKind::RuleViolation, message, line)
            })
            .collect()
    }
}

fn describe(rule: &str) -> &'static str {
    POLICY
        .iter()
        .find(|r| r.name == rule)
        .map(|r| r.description)
        .unwrap_or("")
}

/// Check `code` against the platform policy
pub fn check(code: &str) -> ComplianceReport {
    debug!(len = code.len(), "check: called");
    let mut violations = Vec::new();

    for rule in POLICY.iter() {
        let matches: Vec<String> = code
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim_start().starts_with("//"))
            .filter(|(_, line)| rule.pattern.is_match(line))
            .map(|(i, line)| format!("{}: {}", i + 1, line.trim()))
            .collect();

        let violated = match rule.expectation {
            Expectation::Forbidden => !matches.is_empty(),
            Expectation::AtLeastOne => matches.is_empty(),
            Expectation::ExactlyOne => matches.len() != 1,
        };
        if violated {
            debug!(rule = rule.name, lines = matches.len(), "check: rule violated");
            violations.push(RuleViolation {
                rule: rule.name.to_string(),
                lines: matches,
            });
        }
    }

    ComplianceReport {
        compliant: violations.is_empty(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASE: &str = "const canvas = document.getElementById('gameCanvas');\nconst ctx = canvas.getContext('2d');\nctx.fillText('Score', 10, 10);\n";

    fn rules(report: &ComplianceReport) -> Vec<&str> {
        report.violations.iter().map(|v| v.rule.as_str()).collect()
    }

    #[test]
    fn test_compliant_program() {
        let report = check(BASE);
        assert!(report.compliant);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_alert_is_flagged_with_line() {
        let code = format!("{}alert(\"hi\");\n", BASE);
        let report = check(&code);
        assert!(!report.compliant);
        assert_eq!(rules(&report), vec!["no-blocking-dialogs"]);
        assert_eq!(report.violations[0].lines, vec!["4: alert(\"hi\");"]);
    }

    #[test]
    fn test_method_named_prompt_is_fine() {
        let code = format!("{}ui.prompt('x');\n", BASE);
        assert!(check(&code).compliant);
    }

    #[test]
    fn test_dom_injection() {
        let code = format!("{}el.innerHTML = '<b>x</b>';\nif (el.innerHTML == '') {{}}\n", BASE);
        let report = check(&code);
        assert_eq!(rules(&report), vec!["no-dom-injection"]);
        assert_eq!(report.violations[0].lines.len(), 1);
    }

    #[test]
    fn test_second_canvas() {
        let code = format!("{}const off = document.createElement('canvas');\n", BASE);
        assert_eq!(rules(&check(&code)), vec!["single-render-surface"]);
    }

    #[test]
    fn test_text_drawing_required() {
        let report = check("const canvas = document.getElementById('gameCanvas');\n");
        assert_eq!(rules(&report), vec!["requires-text-drawing"]);
        assert!(report.violations[0].lines.is_empty());
    }

    #[test]
    fn test_surface_lookup_exactly_once() {
        let report = check("ctx.fillText('a', 0, 0);\n");
        assert_eq!(rules(&report), vec!["single-surface-lookup"]);

        let code = format!("{}const again = document.getElementById(\"gameCanvas\");\n", BASE);
        let report = check(&code);
        assert_eq!(rules(&report), vec!["single-surface-lookup"]);
        assert_eq!(report.violations[0].lines.len(), 2);
    }

    #[test]
    fn test_raw_keyboard() {
        let code = format!(
            "{}document.addEventListener('keydown', e => {{\n  if (e.key === 'ArrowLeft') left = true;\n}});\n",
            BASE
        );
        let report = check(&code);
        assert_eq!(rules(&report), vec!["no-raw-keyboard"]);
        assert_eq!(report.violations[0].lines.len(), 2);
    }

    #[test]
    fn test_commented_lines_ignored() {
        let code = format!("{}// alert('debug');\n", BASE);
        assert!(check(&code).compliant);
    }

    #[test]
    fn test_violations_follow_policy_order() {
        let report = check("window.onkeydown = f;\nalert(1);\n");
        assert_eq!(
            rules(&report),
            vec![
                "no-blocking-dialogs",
                "requires-text-drawing",
                "single-surface-lookup",
                "no-raw-keyboard"
            ]
        );
    }

    #[test]
    fn test_to_diagnostics() {
        let code = format!("{}alert(1);\n", BASE);
        let diagnostics = check(&code).to_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::RuleViolation);
        assert_eq!(diagnostics[0].line, Some(4));
    }

    #[test]
    fn test_policy_listing() {
        let names: Vec<&str> = policy().map(|(name, _)| name).collect();
        assert_eq!(names.len(), 6);
        assert_eq!(names[0], "no-blocking-dialogs");
    }

    fn line() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("const canvas = document.getElementById('gameCanvas');".to_string()),
            Just("ctx.fillText('x', 1, 1);".to_string()),
            Just("alert('x');".to_string()),
            Just("el.innerHTML = s;".to_string()),
            Just("if (controls.left) p.x--;".to_string()),
            Just("window.addEventListener('keyup', f);".to_string()),
            "[a-z ().;=]{0,20}",
        ]
    }

    proptest! {
        #[test]
        fn prop_compliant_iff_no_violations(lines in prop::collection::vec(line(), 0..8)) {
            let report = check(&lines.join("\n"));
            prop_assert_eq!(report.compliant, report.violations.is_empty());
        }
    }
}
