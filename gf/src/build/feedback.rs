//! Route final-check failures back to the stage that can fix them

use serde::Serialize;
use tracing::debug;

use super::probe::{ProbeReport, SanityReport};
use crate::validation::ComplianceReport;

/// Where a finished program should go next
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum Feedback {
    /// Ship it
    Accept,
    /// Local fixes to the code are enough
    Repair { reasons: Vec<String> },
    /// The plan itself did not produce a playable game
    Replan { reasons: Vec<String> },
}

impl Feedback {
    pub fn is_accept(&self) -> bool {
        matches!(self, Feedback::Accept)
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            Feedback::Accept => &[],
            Feedback::Repair { reasons } | Feedback::Replan { reasons } => reasons,
        }
    }
}

/// Probe failures mean the plan missed something and win over code-level problems
pub fn classify(sanity: &SanityReport, probe: &ProbeReport, compliance: &ComplianceReport) -> Feedback {
    debug!(
        sanity = sanity.ok(),
        playable = probe.playable(),
        compliant = compliance.compliant,
        "classify: called"
    );
    if sanity.ok() && !probe.playable() {
        return Feedback::Replan {
            reasons: probe.notes.clone(),
        };
    }

    let mut reasons = sanity.problems.clone();
    reasons.extend(compliance.violations.iter().map(|v| {
        if v.lines.is_empty() {
            format!("rule `{}` broken", v.rule)
        } else {
            format!("rule `{}` broken at {}", v.rule, v.lines.join("; "))
        }
    }));
    if !sanity.ok() && reasons.is_empty() {
        reasons.push("the program does not start".to_string());
    }

    if reasons.is_empty() {
        Feedback::Accept
    } else {
        Feedback::Repair { reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::RuleViolation;

    fn sane() -> SanityReport {
        SanityReport {
            parses: true,
            entry_point: Some("init".into()),
            problems: vec![],
        }
    }

    fn playable() -> ProbeReport {
        ProbeReport {
            render_surface: true,
            responsive_input: true,
            player_movement: true,
            win_reachable: true,
            notes: vec![],
        }
    }

    fn compliant() -> ComplianceReport {
        ComplianceReport {
            compliant: true,
            violations: vec![],
        }
    }

    #[test]
    fn test_all_green_is_accept() {
        assert!(classify(&sane(), &playable(), &compliant()).is_accept());
    }

    #[test]
    fn test_unplayable_is_replan() {
        let probe = ProbeReport {
            win_reachable: false,
            notes: vec!["no win or lose state found".into()],
            ..playable()
        };
        let feedback = classify(&sane(), &probe, &compliant());
        assert!(matches!(feedback, Feedback::Replan { .. }));
        assert_eq!(feedback.reasons().len(), 1);
    }

    #[test]
    fn test_rule_violation_is_repair() {
        let compliance = ComplianceReport {
            compliant: false,
            violations: vec![
                RuleViolation {
                    rule: "no-dom-input".into(),
                    lines: vec!["4: document.addEventListener('keydown', onKey);".into()],
                },
                RuleViolation {
                    rule: "win-state".into(),
                    lines: vec![],
                },
            ],
        };
        let feedback = classify(&sane(), &playable(), &compliance);
        let Feedback::Repair { reasons } = feedback else {
            panic!("expected repair");
        };
        assert_eq!(
            reasons,
            vec![
                "rule `no-dom-input` broken at 4: document.addEventListener('keydown', onKey);".to_string(),
                "rule `win-state` broken".to_string(),
            ]
        );
    }

    #[test]
    fn test_broken_program_is_repair_not_replan() {
        let sanity = SanityReport {
            parses: false,
            entry_point: None,
            problems: vec!["program does not parse".into()],
        };
        let probe = ProbeReport::default();
        assert!(matches!(
            classify(&sanity, &probe, &compliant()),
            Feedback::Repair { .. }
        ));
    }

    #[test]
    fn test_serializes_with_target_tag() {
        let value = serde_json::to_value(Feedback::Replan { reasons: vec!["x".into()] }).unwrap();
        assert_eq!(value["target"], "replan");
    }
}
