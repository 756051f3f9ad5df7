//! Best-effort page fetching
//!
//! Every failure mode maps to a bracketed placeholder so callers can keep a
//! result row even when its page is unusable.

use reqwest::Client;
use tracing::{debug, warn};

use super::SearchError;
use crate::config::FetchConfig;

const PLACEHOLDER_PREFIXES: &[&str] = &[
    "[This is a document/binary file:",
    "[Content type not supported:",
    "[Content encoding not supported:",
    "[Error fetching content:",
];

/// Placeholder for URLs that point at documents or images
pub fn binary_placeholder(url: &str) -> String {
    format!("[This is a document/binary file: {url}]")
}

fn unsupported_type_placeholder(content_type: &str) -> String {
    format!("[Content type not supported: {content_type}]")
}

fn unsupported_encoding_placeholder(url: &str) -> String {
    format!("[Content encoding not supported: {url}]")
}

fn error_placeholder(url: &str) -> String {
    format!("[Error fetching content: {url}]")
}

/// True when `content` is one of the fetch placeholders rather than page text
pub fn is_placeholder(content: &str) -> bool {
    PLACEHOLDER_PREFIXES.iter().any(|p| content.starts_with(p))
}

/// True when the URL path ends in one of `extensions` (case-insensitive)
///
/// Query strings and fragments are ignored, so `report.pdf?dl=1` is binary.
pub fn is_binary_url(url: &str, extensions: &[String]) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    extensions.iter().any(|ext| path.ends_with(&ext.to_ascii_lowercase()))
}

/// Decode a body as UTF-8, falling back to Latin-1
///
/// Bodies containing NUL bytes are binary regardless of what the server
/// claimed and are rejected.
fn decode_body(bytes: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (!text.contains('\0')).then(|| text.to_string());
    }
    if bytes.contains(&0) {
        return None;
    }
    Some(bytes.iter().map(|&b| b as char).collect())
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}

pub struct PageFetcher {
    http: Client,
    config: FetchConfig,
}

impl PageFetcher {
    pub fn from_config(config: &FetchConfig) -> Result<Self, SearchError> {
        debug!(timeout_ms = config.timeout_ms, "PageFetcher::from_config: called");
        let http = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Fetch `url` and return its text, converted to markdown for HTML
    pub async fn fetch(&self, url: &str) -> String {
        debug!(%url, "PageFetcher::fetch: called");
        if is_binary_url(url, &self.config.binary_extensions) {
            debug!(%url, "PageFetcher::fetch: binary extension, skipping");
            return binary_placeholder(url);
        }

        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%url, error = %e, "PageFetcher::fetch: request failed");
                return error_placeholder(url);
            }
        };

        if !response.status().is_success() {
            warn!(%url, status = %response.status(), "PageFetcher::fetch: HTTP error status");
            return error_placeholder(url);
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let is_html = content_type.contains("text/html") || content_type.contains("application/xhtml");
        if !is_html && !content_type.contains("text/plain") {
            debug!(%url, %content_type, "PageFetcher::fetch: unsupported content type");
            return unsupported_type_placeholder(&content_type);
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(%url, error = %e, "PageFetcher::fetch: failed to read body");
                return error_placeholder(url);
            }
        };
        let limit = bytes.len().min(self.config.max_bytes);

        let Some(body) = decode_body(&bytes[..limit]) else {
            debug!(%url, "PageFetcher::fetch: undecodable body");
            return unsupported_encoding_placeholder(url);
        };

        let content = if is_html {
            html2md::rewrite_html(&body, false)
        } else {
            body
        };

        let content = truncate_chars(content, self.config.max_chars);
        debug!(%url, content_len = content.len(), "PageFetcher::fetch: success");
        content
    }
}
