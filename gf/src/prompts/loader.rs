//! Prompt Loader
//!
//! Loads prompt templates from an override directory or falls back to the
//! embedded defaults, then renders them with Handlebars.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// Directory of `.pmt` overrides
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `dir` before the embedded prompts
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let exists = dir.is_dir();
        debug!(?dir, %exists, "PromptLoader::new: called");
        Self {
            hbs: engine(),
            override_dir: exists.then(|| dir.to_path_buf()),
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: engine(),
            override_dir: None,
        }
    }

    /// Load a template by name: override directory first, then embedded
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<C: Serialize>(&self, template_name: &str, context: &C) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self::embedded_only()
    }
}

/// Strict rendering, no HTML escaping: prompts carry source code
fn engine() -> Handlebars<'static> {
    let mut hbs = Handlebars::new();
    hbs.set_strict_mode(true);
    hbs.register_escape_fn(handlebars::no_escape);
    hbs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_embedded() {
        let loader = PromptLoader::embedded_only();
        let text = loader
            .render("loop", &json!({ "title": "Coin Dash", "pitch": "Grab coins." }))
            .unwrap();
        assert!(text.contains("Game: Coin Dash"));
        assert!(text.contains("Pitch: Grab coins."));
    }

    #[test]
    fn test_code_is_not_escaped() {
        let loader = PromptLoader::embedded_only();
        let ctx = json!({
            "step": { "id": 2, "label": "Add enemies" },
            "accumulated": "if (a < b && c) { run('x'); }",
            "fragment": "let e = [];",
            "diagnostics": "- none",
            "rules": ["No alerts"],
        });
        let text = loader.render("repair", &ctx).unwrap();
        assert!(text.contains("if (a < b && c) { run('x'); }"));
    }

    #[test]
    fn test_missing_field_fails_in_strict_mode() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.render("loop", &json!({ "title": "x" })).is_err());
    }

    #[test]
    fn test_override_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("loop.pmt"), "custom {{title}}").unwrap();
        let loader = PromptLoader::new(dir.path());
        let text = loader.render("loop", &json!({ "title": "T" })).unwrap();
        assert_eq!(text, "custom T");
        // Not overridden: embedded still used
        assert!(loader.render("idea", &json!({ "seed": null })).is_ok());
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.render("nonexistent-template", &json!({})).is_err());
    }
}
