//! The result of a successful run and how it lands on disk

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::build::{Feedback, ProbeReport, SanityReport};
use crate::design::{GameDefinition, Plan};
use crate::validation::ComplianceReport;

pub const GAME_FILE: &str = "game.js";
pub const MANIFEST_FILE: &str = "game.json";

/// Everything a successful run produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameBundle {
    pub run_id: String,
    pub definition: GameDefinition,
    pub plan: Plan,
    pub code: String,
    pub sanity: SanityReport,
    pub probe: ProbeReport,
    pub compliance: ComplianceReport,
    pub feedback: Feedback,
    pub warnings: Vec<String>,
    pub token_count: u64,
}

impl GameBundle {
    /// Directory name: title slug plus the tail of the run id
    pub fn dir_name(&self) -> String {
        let tail: String = self.run_id.chars().rev().take(8).collect::<Vec<_>>().into_iter().rev().collect();
        let slug = slugify(&self.definition.title);
        if slug.is_empty() {
            format!("game-{}", tail)
        } else {
            format!("{}-{}", slug, tail)
        }
    }

    /// Write `game.js` and `game.json` under `out_dir/<dir_name>`
    pub fn write_to(&self, out_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = out_dir.as_ref().join(self.dir_name());
        debug!(?dir, "GameBundle::write_to: called");
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        fs::write(dir.join(GAME_FILE), &self.code).context("Failed to write game code")?;
        let manifest = serde_json::to_string_pretty(self).context("Failed to serialize game manifest")?;
        fs::write(dir.join(MANIFEST_FILE), manifest).context("Failed to write game manifest")?;

        info!(?dir, run_id = %self.run_id, "GameBundle::write_to: bundle written");
        Ok(dir)
    }
}

fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{BuildStep, Playability};
    use tempfile::tempdir;

    fn bundle(title: &str) -> GameBundle {
        GameBundle {
            run_id: "0190a1b2-c3d4-7e5f-8a9b-0123456789ab".into(),
            definition: GameDefinition {
                title: title.into(),
                description: "Grab coins.".into(),
                mechanics: vec!["move".into()],
                win_condition: "Collect all coins.".into(),
                entities: vec!["player".into()],
                playability: Playability::Valid,
            },
            plan: Plan::new(vec![BuildStep::new(1, "Set up canvas"), BuildStep::new(2, "Show win")]),
            code: "init();\n".into(),
            sanity: SanityReport {
                parses: true,
                entry_point: Some("init ( )".into()),
                problems: vec![],
            },
            probe: ProbeReport::default(),
            compliance: ComplianceReport {
                compliant: true,
                violations: vec![],
            },
            feedback: Feedback::Accept,
            warnings: vec![],
            token_count: 42,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Coin Dash!"), "coin-dash");
        assert_eq!(slugify("  --Space   Rocks 2-- "), "space-rocks-2");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_dir_name_uses_run_id_tail() {
        assert_eq!(bundle("Coin Dash").dir_name(), "coin-dash-456789ab");
        assert_eq!(bundle("???").dir_name(), "game-456789ab");
    }

    #[test]
    fn test_write_to() {
        let temp = tempdir().unwrap();
        let dir = bundle("Coin Dash").write_to(temp.path()).unwrap();

        assert_eq!(fs::read_to_string(dir.join(GAME_FILE)).unwrap(), "init();\n");
        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest["definition"]["winCondition"], "Collect all coins.");
        assert_eq!(manifest["feedback"]["target"], "accept");
        assert_eq!(manifest["tokenCount"], 42);
    }
}
