//! LLM module for GameForge
//!
//! Provider clients, the canonical request/response types, and the gateway
//! that applies timeout, retry and schema policy on top of them.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod gateway;
mod openai;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use gateway::{
    CompleteOptions, Completion, GatewayError, GatewayPolicy, LlmGateway, extract_json, strip_code_fences,
};
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Supports "anthropic" and "openai" providers.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => {
            debug!("create_client: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        "openai" => {
            debug!("create_client: creating OpenAI client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: anthropic, openai",
                other
            )))
        }
    }
}

/// Build a gateway from config
pub fn create_gateway(config: &LlmConfig) -> Result<LlmGateway, LlmError> {
    let client = create_client(config)?;
    Ok(LlmGateway::new(client, GatewayPolicy::from(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        let err = create_client(&config).err().unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }
}
