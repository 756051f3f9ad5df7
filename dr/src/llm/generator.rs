//! Content generator facade used by research stages
//!
//! Wraps an `LlmClient` with the configured sampling parameters and a hard
//! per-call timeout, and offers free-text, schema-constrained and streamed
//! generation.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::structured::parse_structured;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StreamChunk};
use crate::config::LlmConfig;

#[derive(Clone)]
pub struct Generator {
    client: Arc<dyn LlmClient>,
    max_tokens: u32,
    temperature: f32,
    structured_temperature: f32,
    timeout: Duration,
}

impl Generator {
    pub fn new(client: Arc<dyn LlmClient>, config: &LlmConfig) -> Self {
        debug!(model = %config.model, "Generator::new: called");
        Self {
            client,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            structured_temperature: config.structured_temperature,
            timeout: config.timeout(),
        }
    }

    fn request(&self, system: &str, prompt: &str, temperature: f32) -> CompletionRequest {
        let mut request = CompletionRequest::single(system, prompt, self.max_tokens);
        request.temperature = Some(temperature);
        request
    }

    async fn complete_with_timeout(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match tokio::time::timeout(self.timeout, self.client.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "complete_with_timeout: generator timed out");
                Err(LlmError::Timeout(self.timeout))
            }
        }
    }

    /// Free-text generation
    pub async fn generate_text(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        debug!(prompt_len = prompt.len(), "generate_text: called");
        let response = self
            .complete_with_timeout(self.request(system, prompt, self.temperature))
            .await?;

        match response.content {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(LlmError::InvalidResponse("empty response".to_string())),
        }
    }

    /// Generation constrained to a JSON schema, parsed into `T`
    ///
    /// The schema is appended to the prompt; the reply is recovered with
    /// `parse_structured`, so fenced or chatty output still parses.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        system: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<T, LlmError> {
        debug!(prompt_len = prompt.len(), "generate_structured: called");
        let schema_text = serde_json::to_string_pretty(schema)?;
        let full_prompt = format!(
            "{prompt}\n\nRespond with a single JSON object that conforms to this JSON schema:\n{schema_text}\n\nOutput only the JSON object."
        );

        let response = self
            .complete_with_timeout(self.request(system, &full_prompt, self.structured_temperature))
            .await?;

        let text = response
            .content
            .ok_or_else(|| LlmError::InvalidResponse("empty response".to_string()))?;
        parse_structured(&text)
    }

    /// Streamed free-text generation; deltas go to `chunk_tx`
    pub async fn stream_text(
        &self,
        system: &str,
        prompt: &str,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(prompt_len = prompt.len(), "stream_text: called");
        self.client
            .stream(self.request(system, prompt, self.temperature), chunk_tx)
            .await
    }
}
