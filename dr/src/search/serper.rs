//! Serper-style search API client

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{SearchError, SearchHit};
use crate::config::SearchConfig;

pub struct SerperClient {
    http: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl SerperClient {
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        debug!(base_url = %config.base_url, "SerperClient::from_config: called");
        let api_key = config
            .api_key()
            .map_err(|e| SearchError::MissingKey(e.to_string()))?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.clone(),
            timeout,
        })
    }

    pub async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError> {
        debug!(%query, count, "SerperClient::search: called");
        let response = self
            .http
            .post(&self.base_url)
            .header("X-API-KEY", &self.api_key)
            .header("content-type", "application/json")
            .json(&serde_json::json!({ "q": query, "num": count }))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(%query, status = status.as_u16(), "SerperClient::search: API error");
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        let hits = body.into_hits(count);
        debug!(%query, hit_count = hits.len(), "SerperClient::search: success");
        Ok(hits)
    }

    fn map_transport(&self, e: reqwest::Error) -> SearchError {
        if e.is_timeout() {
            SearchError::Timeout(self.timeout)
        } else {
            SearchError::Network(e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    link: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl SerperResponse {
    /// Keep results that carry a link, in rank order
    fn into_hits(self, count: usize) -> Vec<SearchHit> {
        self.organic
            .into_iter()
            .filter_map(|r| {
                r.link.filter(|l| !l.is_empty()).map(|url| SearchHit {
                    url,
                    title: r.title,
                    snippet: r.snippet,
                })
            })
            .take(count)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use serde_json::Value;

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/search")
    }

    fn client(base_url: String) -> SerperClient {
        SerperClient {
            http: Client::new(),
            api_key: "key-123".to_string(),
            base_url,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_into_hits_skips_missing_links() {
        let body: SerperResponse = serde_json::from_str(
            r#"{"organic": [
                {"link": "https://a.example", "title": "A", "snippet": "first"},
                {"title": "no link"},
                {"link": "https://b.example", "title": "B"}
            ]}"#,
        )
        .unwrap();

        let hits = body.into_hits(5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://a.example");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn test_into_hits_respects_count_and_missing_organic() {
        let body: SerperResponse = serde_json::from_str(
            r#"{"organic": [{"link": "https://a"}, {"link": "https://b"}, {"link": "https://c"}]}"#,
        )
        .unwrap();
        assert_eq!(body.into_hits(2).len(), 2);

        let empty: SerperResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.into_hits(3).is_empty());
    }

    #[tokio::test]
    async fn test_search_sends_key_and_body() {
        let app = Router::new().route(
            "/search",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("X-API-KEY").unwrap(), "key-123");
                assert_eq!(body["q"], "battery storage");
                assert_eq!(body["num"], 4);
                Json(serde_json::json!({
                    "organic": [{"link": "https://x.example", "title": "X", "snippet": "s"}]
                }))
            }),
        );
        let url = spawn_stub(app).await;

        let hits = client(url).search("battery storage", 4).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "X");
    }

    #[tokio::test]
    async fn test_search_api_error() {
        let app = Router::new().route("/search", post(|| async { (StatusCode::FORBIDDEN, "bad key") }));
        let url = spawn_stub(app).await;

        let err = client(url).search("q", 3).await.unwrap_err();
        assert!(matches!(err, SearchError::Api { status: 403, .. }));
    }
}
