//! Web retrieval: search API client and best-effort page fetching
//!
//! The orchestrator only sees the `WebRetriever` trait. `search` may fail;
//! `fetch` never does, it degrades to a bracketed placeholder string instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

mod fetch;
mod serper;

pub use fetch::{PageFetcher, binary_placeholder, is_binary_url, is_placeholder};
pub use serper::SerperClient;

use crate::config::Config;

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Errors from the search provider
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search API key missing: {0}")]
    MissingKey(String),

    #[error("Search API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),
}

/// Search and page retrieval as seen by the research stages
#[async_trait]
pub trait WebRetriever: Send + Sync {
    /// Ranked results for `query`, at most `count`
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError>;

    /// Page text for `url`, or a placeholder describing why there is none
    async fn fetch(&self, url: &str) -> String;
}

/// Production retriever: Serper-style search plus the HTTP page fetcher
pub struct HttpRetriever {
    search: SerperClient,
    fetcher: PageFetcher,
}

impl HttpRetriever {
    pub fn new(search: SerperClient, fetcher: PageFetcher) -> Self {
        Self { search, fetcher }
    }
}

#[async_trait]
impl WebRetriever for HttpRetriever {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError> {
        self.search.search(query, count).await
    }

    async fn fetch(&self, url: &str) -> String {
        self.fetcher.fetch(url).await
    }
}

/// Build the production retriever from configuration
pub fn create_retriever(config: &Config) -> Result<Arc<dyn WebRetriever>, SearchError> {
    debug!(base_url = %config.search.base_url, "create_retriever: called");
    let search = SerperClient::from_config(&config.search)?;
    let fetcher = PageFetcher::from_config(&config.fetch)?;
    Ok(Arc::new(HttpRetriever::new(search, fetcher)))
}
