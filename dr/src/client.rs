//! HTTP client for a running research server
//!
//! Used by `dr watch` to follow a session's progress stream.

use eyre::{Result, eyre};
use futures::StreamExt;
use reqwest_eventsource::{Error as SseError, Event, EventSource};
use serde_json::Value;
use tracing::{debug, warn};

use crate::progress::Notice;

pub struct ResearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl ResearchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(%base_url, "ResearchClient::new: called");
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Current `{status, step, iterations, error?}` of a session
    pub async fn status(&self, session_id: &str) -> Result<Value> {
        let url = format!("{}/api/research/{session_id}/status", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(eyre!("{} returned {}", url, response.status()));
        }
        Ok(response.json().await?)
    }

    /// Follow the progress stream from `from`, calling `on_notice` per notice
    ///
    /// Returns after the terminal notice, or when the server ends the stream.
    pub async fn watch(&self, session_id: &str, from: usize, mut on_notice: impl FnMut(usize, &Notice)) -> Result<()> {
        let url = format!("{}/api/research/{session_id}/stream?from={from}", self.base_url);
        debug!(%url, "watch: called");
        let mut es = EventSource::new(self.http.get(&url)).map_err(|e| eyre!("cannot open {url}: {e}"))?;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => debug!("watch: stream opened"),
                Ok(Event::Message(msg)) => {
                    let notice: Notice = match serde_json::from_str(&msg.data) {
                        Ok(notice) => notice,
                        Err(e) => {
                            warn!(error = %e, data = %msg.data, "watch: skipping unparseable notice");
                            continue;
                        }
                    };
                    let offset = msg.id.parse().unwrap_or(from);
                    on_notice(offset, &notice);
                    if notice.is_terminal() {
                        es.close();
                        return Ok(());
                    }
                }
                Err(SseError::StreamEnded) => {
                    debug!("watch: stream ended");
                    es.close();
                    return Ok(());
                }
                Err(SseError::InvalidStatusCode(status, _)) => {
                    es.close();
                    return Err(eyre!("{url} returned {status}"));
                }
                Err(e) => {
                    es.close();
                    return Err(eyre!("progress stream failed: {e}"));
                }
            }
        }
        Ok(())
    }
}
