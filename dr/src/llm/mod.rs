//! LLM client module for DeepResearch
//!
//! Provides the provider client, structured-output recovery and the
//! `Generator` facade the research stages call.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod generator;
mod openai;
pub mod structured;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use generator::Generator;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, StreamChunk, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Only "openai" (and OpenAI-compatible endpoints via `base-url`) is supported.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" => {
            debug!("create_client: creating OpenAI client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: openai",
                other
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "bogus".to_string(),
            ..Default::default()
        };
        let err = create_client(&config).err().expect("should fail");
        assert!(err.to_string().contains("bogus"));
    }
}
