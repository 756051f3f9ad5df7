//! HTTP API for research sessions
//!
//! JSON endpoints under `/api/research`, plus two SSE streams per session:
//! progress notices and raw report prose.

mod error;
mod handlers;
mod sse;
mod state;

pub use error::ApiError;
pub use state::AppState;

use std::net::SocketAddr;

use axum::Router;
use axum::http::HeaderValue;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::routing::get;
use eyre::{Context, Result};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::research::spawn_sweeper;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([CONTENT_TYPE, ACCEPT]);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(allowed)
    }
}

/// Build the router over `state`
pub fn router(state: AppState) -> Router {
    debug!("router: called");
    let cors = cors_layer(&state.config.server.cors_origins);
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/research",
            get(handlers::list_research).post(handlers::create_research),
        )
        .route(
            "/api/research/:id/clarification",
            get(handlers::get_clarification).post(handlers::submit_clarification),
        )
        .route("/api/research/:id/status", get(handlers::get_status))
        .route("/api/research/:id/report", get(handlers::get_report))
        .route("/api/research/:id/stream", get(sse::progress_stream))
        .route("/api/research/:id/report/stream", get(sse::report_stream))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until ctrl-c
pub async fn run_server(state: AppState, bind: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .context(format!("Invalid address: {bind}:{port}"))?;

    let sweeper = spawn_sweeper(state.orchestrator.clone(), state.config.store.clone());
    let runner = state.runner.clone();

    let listener = TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to {addr}"))?;
    info!(%addr, "Server listening");
    println!("Deep research server listening on http://{addr}");

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "run_server: failed to listen for ctrl-c");
            }
            info!("Shutdown signal received");
        })
        .await
        .context("Server error");

    runner.shutdown();
    sweeper.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::client::mock::ScriptedLlmClient;
    use crate::research::testing::{StubRetriever, happy_responder, test_context};
    use crate::store::MemoryStore;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let ctx = test_context(
            Arc::new(ScriptedLlmClient::new(happy_responder)),
            Arc::new(StubRetriever::new(2)),
        );
        AppState::new(ctx, Arc::new(MemoryStore::spawn()), Config::default())
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(app: &Router) -> String {
        let (status, body) = call(app, "POST", "/api/research", Some(json!({"topic": "energy storage"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "clarification_needed");
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(state());
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let app = router(state());
        for uri in [
            "/api/research/nope/status",
            "/api/research/nope/report",
            "/api/research/nope/clarification",
            "/api/research/nope/stream",
            "/api/research/nope/report/stream",
        ] {
            let (status, _) = call(&app, "GET", uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }
        let (status, _) = call(
            &app,
            "POST",
            "/api/research/nope/clarification",
            Some(json!({"answers": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_topic_rejected() {
        let app = router(state());
        let (status, body) = call(&app, "POST", "/api/research", Some(json!({"topic": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("topic"));
    }

    #[tokio::test]
    async fn test_research_flow() {
        let state = state();
        let app = router(state.clone());
        let id = create(&app).await;

        // Answers before questions is a conflict
        let answers = json!({"answers": {"q1": "Europe", "q2": "2030"}});
        let (status, _) = call(&app, "POST", &format!("/api/research/{id}/clarification"), Some(answers.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, first) = call(&app, "GET", &format!("/api/research/{id}/clarification"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["questions"].as_array().unwrap().len(), 4);
        let (_, second) = call(&app, "GET", &format!("/api/research/{id}/clarification"), None).await;
        assert_eq!(first, second);

        let (status, _) = call(&app, "GET", &format!("/api/research/{id}/report"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, "POST", &format!("/api/research/{id}/clarification"), Some(answers)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "generating_plan");

        state.runner.wait(&id).await;

        let (status, body) = call(&app, "GET", &format!("/api/research/{id}/status"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["iterations"], 1);
        assert!(body.get("error").is_none());

        let (status, report) = call(&app, "GET", &format!("/api/research/{id}/report"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["title"], "The State of Energy Storage");
        assert_eq!(report["metadata"]["topic"], "energy storage");

        let (status, list) = call(&app, "GET", "/api/research", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_stream_replays_from_offset() {
        let state = state();
        let app = router(state.clone());
        let id = create(&app).await;
        state.orchestrator.fail_session(&id, "stopped").await.unwrap();

        let request = Request::builder()
            .uri(format!("/api/research/{id}/stream"))
            .header("last-event-id", "0")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("id: 0\n"));
        assert!(text.contains("id: 1\n"));
        assert!(text.contains("event: error"));
    }

    #[tokio::test]
    async fn test_report_stream_needs_curated_context() {
        let app = router(state());
        let id = create(&app).await;
        let (status, _) = call(&app, "GET", &format!("/api/research/{id}/report/stream"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
