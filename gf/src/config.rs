//! GameForge configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main GameForge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Pipeline policy knobs
    pub pipeline: PipelineConfig,

    /// Log level (overridden by --log-level)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the API key environment variable is set. Call this early in
    /// startup to fail fast with a clear error message.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .gameforge.yml
        let local_config = PathBuf::from(".gameforge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/gameforge/gameforge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("gameforge").join("gameforge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed: a broken config file is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(p) => p.clone(),
            None => PathBuf::from(".gameforge.yml"),
        };
        let content = fs::read_to_string(path).ok()?;
        let config: Self = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("anthropic" or "openai")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries for transient provider errors
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First backoff delay, doubled on each retry
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("Environment variable {} not set", self.api_key_env))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8192,
            timeout_ms: 120_000,
            max_retries: 3,
            initial_backoff_ms: 1000,
        }
    }
}

/// Pipeline policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Repair attempts per build step before diagnostics become warnings
    #[serde(rename = "max-repair-attempts")]
    pub max_repair_attempts: u32,

    /// AutoFix passes allowed when the playability heuristic rejects a design
    #[serde(rename = "max-autofix-attempts")]
    pub max_autofix_attempts: u32,

    /// Fail final assembly when the compliance checker reports violations
    #[serde(rename = "block-on-rule-violation")]
    pub block_on_rule_violation: bool,

    /// Broadcast channel capacity for progress events
    #[serde(rename = "event-capacity")]
    pub event_capacity: usize,

    /// Directory for per-run event logs
    #[serde(rename = "runs-dir")]
    pub runs_dir: PathBuf,

    /// Directory of `.pmt` files overriding the embedded prompts
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let runs_dir = dirs::data_local_dir()
            .map(|d| d.join("gameforge").join("runs"))
            .unwrap_or_else(|| PathBuf::from(".gameforge/runs"));

        Self {
            max_repair_attempts: 1,
            max_autofix_attempts: 1,
            block_on_rule_violation: false,
            event_capacity: 1024,
            runs_dir,
            prompts_dir: None,
        }
    }
}
