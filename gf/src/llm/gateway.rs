//! LLM Gateway - the only way pipeline code talks to a model
//!
//! Wraps an [`LlmClient`] with the per-call timeout, bounded retry with
//! exponential backoff, and JSON-schema validation of structured replies.
//! Provider quirks stop at this boundary: callers only ever see
//! [`Completion`] values or a [`GatewayError`].

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Message, TokenUsage};
use crate::config::LlmConfig;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a senior game developer who builds small HTML5 canvas arcade games.";

/// Errors surfaced by the gateway
///
/// Kept separate from pipeline errors so stages can decide between retrying,
/// falling back, or aborting.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Provider unavailable, timed out, or retries exhausted
    #[error("provider error: {0}")]
    Provider(#[source] LlmError),

    /// The model replied, but not in the required shape
    #[error("schema error: {message}")]
    Schema {
        message: String,
        raw: String,
        usage: TokenUsage,
    },
}

impl GatewayError {
    pub fn is_provider(&self) -> bool {
        matches!(self, GatewayError::Provider(_))
    }

    /// Tokens spent before the failure was detected
    pub fn usage(&self) -> TokenUsage {
        match self {
            GatewayError::Provider(_) => TokenUsage::default(),
            GatewayError::Schema { usage, .. } => *usage,
        }
    }
}

/// A gateway result paired with the tokens it cost
#[derive(Debug, Clone)]
pub struct Completion<T> {
    pub value: T,
    pub usage: TokenUsage,
}

impl<T> Completion<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        Completion {
            value: f(self.value),
            usage: self.usage,
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CompleteOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system: Option<String>,
}

impl CompleteOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Timeout and retry policy
#[derive(Debug, Clone)]
pub struct GatewayPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_tokens: u32,
}

impl From<&LlmConfig> for GatewayPolicy {
    fn from(config: &LlmConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

/// Capability-typed wrapper around a completion provider
#[derive(Clone)]
pub struct LlmGateway {
    client: Arc<dyn LlmClient>,
    policy: GatewayPolicy,
}

impl LlmGateway {
    pub fn new(client: Arc<dyn LlmClient>, policy: GatewayPolicy) -> Self {
        debug!(model = client.model(), ?policy, "LlmGateway::new: called");
        Self { client, policy }
    }

    pub fn policy(&self) -> &GatewayPolicy {
        &self.policy
    }

    /// Free-text completion
    pub async fn complete(&self, prompt: &str, options: &CompleteOptions) -> Result<Completion<String>, GatewayError> {
        debug!(prompt_len = prompt.len(), "complete: called");
        let request = CompletionRequest {
            system_prompt: options
                .system
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            messages: vec![Message::user(prompt)],
            max_tokens: options.max_tokens.unwrap_or(self.policy.max_tokens),
            temperature: options.temperature,
        };

        let response = self.send_with_retry(request).await.map_err(GatewayError::Provider)?;
        Ok(normalize(response))
    }

    /// Completion that must be JSON matching `schema`
    ///
    /// A reply that fails to parse or validate gets one stricter re-prompt
    /// quoting the errors; a second failure is a [`GatewayError::Schema`].
    pub async fn complete_structured(
        &self,
        prompt: &str,
        schema: &Value,
        options: &CompleteOptions,
    ) -> Result<Completion<Value>, GatewayError> {
        debug!(prompt_len = prompt.len(), "complete_structured: called");
        let validator = jsonschema::validator_for(schema).map_err(|e| GatewayError::Schema {
            message: format!("invalid schema: {}", e),
            raw: String::new(),
            usage: TokenUsage::default(),
        })?;

        let schema_text = serde_json::to_string_pretty(schema).unwrap_or_default();
        let first_prompt = format!(
            "{}\n\nRespond with a single JSON value matching this JSON Schema:\n{}",
            prompt, schema_text
        );

        let mut usage = TokenUsage::default();
        let first = self.complete(&first_prompt, options).await?;
        usage = usage.add(&first.usage);

        let errors = match check_structured(&validator, &first.value) {
            Ok(value) => return Ok(Completion { value, usage }),
            Err(errors) => errors,
        };
        warn!(errors = %errors, "complete_structured: reply did not match schema, re-prompting");

        let strict_prompt = format!(
            "{}\n\nYour previous reply was rejected: {}\n\
             Respond with ONLY a JSON value matching this JSON Schema. \
             No prose, no markdown fences.\n{}",
            prompt, errors, schema_text
        );
        let second = self.complete(&strict_prompt, options).await?;
        usage = usage.add(&second.usage);

        match check_structured(&validator, &second.value) {
            Ok(value) => Ok(Completion { value, usage }),
            Err(message) => Err(GatewayError::Schema {
                message,
                raw: second.value,
                usage,
            }),
        }
    }

    /// Structured completion deserialized into `T`
    pub async fn complete_as<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema: &Value,
        options: &CompleteOptions,
    ) -> Result<Completion<T>, GatewayError> {
        let completion = self.complete_structured(prompt, schema, options).await?;
        let raw = completion.value.to_string();
        match serde_json::from_value::<T>(completion.value) {
            Ok(value) => Ok(Completion {
                value,
                usage: completion.usage,
            }),
            Err(e) => Err(GatewayError::Schema {
                message: e.to_string(),
                raw,
                usage: completion.usage,
            }),
        }
    }

    async fn send_with_retry(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.policy.timeout, self.client.complete(request.clone())).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.policy.timeout)),
            };

            match result {
                Ok(response) => {
                    debug!(attempt, tokens = response.usage.total(), "send_with_retry: success");
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let backoff = e
                        .retry_after()
                        .unwrap_or_else(|| self.policy.initial_backoff * 2u32.pow(attempt));
                    warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %e, "send_with_retry: retrying after transient error");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "send_with_retry: giving up");
                    return Err(e);
                }
            }
        }
    }
}

/// Turn a provider response into the canonical `{text, usage}` shape
fn normalize(response: CompletionResponse) -> Completion<String> {
    Completion {
        value: response.text.trim().to_string(),
        usage: response.usage,
    }
}

fn check_structured(validator: &jsonschema::Validator, text: &str) -> Result<Value, String> {
    let value = extract_json(text).ok_or_else(|| "reply contained no JSON value".to_string())?;
    let messages: Vec<String> = validator.iter_errors(&value).map(|err| err.to_string()).collect();
    if messages.is_empty() {
        Ok(value)
    } else {
        Err(messages.join("; "))
    }
}

/// Pull the first JSON value out of a model reply
///
/// Accepts bare JSON, fenced JSON, or JSON surrounded by prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let body = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(body.trim()) {
        return Some(value);
    }

    let start = body.find(['{', '['])?;
    let closer = if body[start..].starts_with('{') { '}' } else { ']' };
    let end = body.rfind(closer)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}

/// Return the contents of the first fenced block, or the whole text
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_open = &trimmed[open + 3..];
    // Skip the info string (```js, ```javascript, ```json)
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim().to_string(),
        None => body.trim().to_string(),
    }
}
