//! OpenAI-compatible chat completions client
//!
//! Works against any endpoint speaking the `/v1/chat/completions` shape.
//! Transient failures (network, 408/429/5xx) are retried with exponential
//! backoff before the first byte of a response is consumed; once a stream has
//! started delivering text it is never retried.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, StreamChunk, TokenUsage};
use crate::config::LlmConfig;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
/// Upper bound on a server-supplied `retry-after`
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

fn is_transient(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Models that take `max_completion_tokens` and reject `temperature`
fn is_reasoning_model(model: &str) -> bool {
    ["o1", "o3", "o4", "gpt-5"].iter().any(|p| model.starts_with(p))
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// Client for OpenAI and OpenAI-compatible providers
pub struct OpenAIClient {
    model: String,
    api_key: String,
    endpoint: String,
    http: Client,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, base_url = %config.base_url, "OpenAIClient::from_config: called");
        let api_key = config
            .api_key()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let http = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            endpoint: format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/')),
            http,
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        })
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> ChatBody<'a> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let limit = request.max_tokens.min(self.max_tokens);
        let reasoning = is_reasoning_model(model);

        let messages = std::iter::once(ChatMessage {
            role: "system",
            content: &request.system_prompt,
        })
        .chain(request.messages.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }))
        .collect();

        ChatBody {
            model,
            messages,
            max_tokens: (!reasoning).then_some(limit),
            max_completion_tokens: reasoning.then_some(limit),
            temperature: if reasoning { None } else { request.temperature },
            stream,
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }

    /// POST the body, retrying transient failures; returns a successful response
    async fn post(&self, body: &ChatBody<'_>) -> Result<Response, LlmError> {
        let mut attempt = 0;
        loop {
            let outcome = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            let (error, wait) = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER));
                    let message = response.text().await.unwrap_or_default();
                    if !is_transient(status) {
                        debug!(status, "OpenAIClient::post: non-retryable status");
                        return Err(LlmError::ApiError { status, message });
                    }
                    let error = match (status, retry_after) {
                        (429, Some(retry_after)) => LlmError::RateLimited { retry_after },
                        _ => LlmError::ApiError { status, message },
                    };
                    (error, retry_after)
                }
                Err(e) if e.is_timeout() => (LlmError::Timeout(self.timeout), None),
                Err(e) => (LlmError::Network(e), None),
            };

            if attempt >= MAX_RETRIES {
                return Err(error);
            }
            attempt += 1;
            let wait = wait.unwrap_or_else(|| Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1)));
            warn!(attempt, wait_ms = wait.as_millis() as u64, error = %error, "OpenAIClient::post: retrying");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Decode one SSE line of a streamed completion
///
/// Blank lines, comments, the `[DONE]` sentinel and undecodable payloads
/// yield None.
fn parse_stream_line(line: &str) -> Option<StreamEnvelope> {
    let data = line.trim().strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return None;
    }
    serde_json::from_str(data).ok()
}

/// Remove the first complete line from `buf` and decode it
///
/// Bytes after the last newline stay buffered, so a character split across
/// network chunks is decoded once both halves have arrived.
fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let end = buf.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buf.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}

fn usage_of(u: &WireUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model, max_tokens = request.max_tokens, "OpenAIClient::complete: called");
        let response = self.post(&self.body(&request, false)).await?;
        let reply: CompletionEnvelope = response.json().await?;

        let (content, stop_reason) = match reply.choices.into_iter().next() {
            Some(choice) => (
                choice.message.content,
                choice
                    .finish_reason
                    .as_deref()
                    .map(StopReason::from_openai)
                    .unwrap_or(StopReason::EndTurn),
            ),
            None => return Err(LlmError::InvalidResponse("completion has no choices".to_string())),
        };

        Ok(CompletionResponse {
            content,
            stop_reason,
            usage: reply.usage.as_ref().map(usage_of).unwrap_or_default(),
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model, max_tokens = request.max_tokens, "OpenAIClient::stream: called");
        let response = self.post(&self.body(&request, true)).await?;

        let mut bytes = response.bytes_stream();
        let mut text = String::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = TokenUsage::default();

        'read: while let Some(chunk) = bytes.next().await {
            pending.extend_from_slice(&chunk?);

            while let Some(line) = take_line(&mut pending) {
                let Some(envelope) = parse_stream_line(&line) else {
                    continue;
                };

                if let Some(u) = &envelope.usage {
                    usage = usage_of(u);
                }
                let Some(choice) = envelope.choices.into_iter().next() else {
                    continue;
                };
                if let Some(reason) = choice.finish_reason.as_deref() {
                    stop_reason = StopReason::from_openai(reason);
                }
                if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                    text.push_str(&delta);
                    if chunk_tx.send(StreamChunk::TextDelta(delta)).await.is_err() {
                        debug!("OpenAIClient::stream: receiver dropped, abandoning generation");
                        break 'read;
                    }
                }
            }
        }

        let _ = chunk_tx
            .send(StreamChunk::MessageDone {
                stop_reason: stop_reason.clone(),
                usage: usage.clone(),
            })
            .await;

        Ok(CompletionResponse {
            content: (!text.is_empty()).then_some(text),
            stop_reason,
            usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    choices: Vec<CompletionChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
