//! Recovery of JSON objects from model output
//!
//! Models asked for JSON frequently wrap it in markdown fences or add a
//! sentence before or after. Candidates are tried in order: the whole text,
//! the first fenced block, then the widest `{ ... }` span.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use super::LlmError;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("valid fence regex"));

static OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid object regex"));

/// Extract the first JSON object found in `text`
pub fn extract_json(text: &str) -> Result<Value, LlmError> {
    debug!(text_len = text.len(), "extract_json: called");
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && value.is_object()
    {
        debug!("extract_json: parsed whole text");
        return Ok(value);
    }

    if let Some(caps) = FENCE_RE.captures(trimmed)
        && let Some(inner) = caps.get(1)
        && let Ok(value) = serde_json::from_str::<Value>(inner.as_str().trim())
        && value.is_object()
    {
        debug!("extract_json: parsed fenced block");
        return Ok(value);
    }

    if let Some(m) = OBJECT_RE.find(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(m.as_str())
    {
        debug!("extract_json: parsed brace span");
        return Ok(value);
    }

    let preview: String = trimmed.chars().take(120).collect();
    debug!(%preview, "extract_json: no JSON object found");
    Err(LlmError::MalformedOutput(format!("no JSON object in model output: {preview}")))
}

/// Extract a JSON object and deserialize it into `T`
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|e| LlmError::MalformedOutput(e.to_string()))
}
