//! End-to-end research sessions against stub collaborators
//!
//! The generator and retriever are replaced by in-process doubles; everything
//! between them (stages, orchestrator, runner, store, progress log) is real.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use deepresearch::config::Config;
use deepresearch::llm::{CompletionRequest, CompletionResponse, Generator, LlmClient, LlmError, StreamChunk};
use deepresearch::progress::{DetailKind, Notice};
use deepresearch::prompts::PromptLoader;
use deepresearch::research::{DepthHint, ResearchContext, SessionStatus};
use deepresearch::search::{SearchError, SearchHit, WebRetriever};
use deepresearch::server::AppState;
use deepresearch::store::MemoryStore;

// =============================================================================
// Doubles
// =============================================================================

/// Generator that answers by stage, recognized from the system prompt
struct StageLlm {
    sufficient: bool,
    calls: Mutex<Vec<String>>,
}

impl StageLlm {
    fn new(sufficient: bool) -> Self {
        Self {
            sufficient,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }

    fn reply(&self, system: &str) -> String {
        if system.contains("clarifying research topics") {
            r#"{"questions": [
                {"id": "q1", "question": "Which region?"},
                {"id": "q2", "question": "Which timeframe?"},
                {"id": "q3", "question": "Grid-scale or residential?"},
                {"id": "q4", "question": "Which technologies?"}
            ]}"#
            .to_string()
        } else if system.contains("research strategist") {
            r#"{"queries": ["lithium-ion grid storage", "pumped hydro storage", "flow batteries", "storage policy"]}"#
                .to_string()
        } else if system.contains("research curator") {
            "Grid storage deployments doubled [1].".to_string()
        } else if system.contains("content analyzer") {
            r#"{"main_topics": [{"title": "Technologies"}, {"title": "Markets"}]}"#.to_string()
        } else if system.contains("research evaluator") {
            format!(
                r#"{{"is_sufficient": {}, "missing_aspects": ["costs"], "additional_queries": ["storage costs"], "confidence_score": 0.8}}"#,
                self.sufficient
            )
        } else if system.contains("titles for research reports") {
            r#"{"title": "Renewable Energy Storage in Practice"}"#.to_string()
        } else if system.contains("introductions") {
            r#"{"introduction": "Storage balances renewables."}"#.to_string()
        } else if system.contains("sections for research reports") {
            r#"{"content": "Deployments grew [1][2].", "references": [1, 2]}"#.to_string()
        } else if system.contains("conclusions") {
            r#"{"conclusion": "Storage is scaling."}"#.to_string()
        } else {
            "Free-form report text.".to_string()
        }
    }
}

#[async_trait]
impl LlmClient for StageLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.lock().unwrap().push(request.system_prompt.clone());
        Ok(CompletionResponse::text(self.reply(&request.system_prompt)))
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        let response = self.complete(request).await?;
        if let Some(text) = &response.content {
            let _ = chunk_tx.send(StreamChunk::TextDelta(text.clone())).await;
        }
        Ok(response)
    }
}

/// Two results per query; the second result of every query is a PDF
struct TwoHitRetriever {
    fetched: Mutex<Vec<String>>,
    searches: AtomicUsize,
}

impl TwoHitRetriever {
    fn new() -> Self {
        Self {
            fetched: Mutex::new(Vec::new()),
            searches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WebRetriever for TwoHitRetriever {
    async fn search(&self, query: &str, _count: usize) -> Result<Vec<SearchHit>, SearchError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let slug = query.replace(' ', "-");
        Ok(vec![
            SearchHit {
                url: format!("https://news.example.org/{slug}"),
                title: format!("News on {query}"),
                snippet: format!("Latest on {query}"),
            },
            SearchHit {
                url: format!("https://papers.example.org/{slug}.pdf"),
                title: format!("Paper on {query}"),
                snippet: format!("Study of {query}"),
            },
        ])
    }

    async fn fetch(&self, url: &str) -> String {
        self.fetched.lock().unwrap().push(url.to_string());
        format!("Article body from {url}")
    }
}

fn app(llm: Arc<StageLlm>, retriever: Arc<TwoHitRetriever>) -> AppState {
    let mut config = Config::default();
    config.research.stage_pause_ms = 0;
    config.research.progress_poll_ms = 20;
    let ctx = ResearchContext {
        generator: Generator::new(llm, &config.llm),
        retriever,
        prompts: Arc::new(PromptLoader::embedded_only()),
        research: config.research.clone(),
        search: config.search.clone(),
        fetch: config.fetch.clone(),
    };
    AppState::new(ctx, Arc::new(MemoryStore::spawn()), config)
}

async fn answer_all(state: &AppState, session_id: &str) {
    let questions = state.orchestrator.request_clarification(session_id).await.unwrap();
    let answers: BTreeMap<String, String> = questions
        .iter()
        .map(|q| (q.id.clone(), format!("Answer to {}", q.question)))
        .collect();
    state.orchestrator.submit_answers(session_id, answers).await.unwrap();
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_renewable_energy_storage_scenario() {
    let llm = Arc::new(StageLlm::new(true));
    let retriever = Arc::new(TwoHitRetriever::new());
    let state = app(llm.clone(), retriever.clone());

    let session = state
        .orchestrator
        .create_session("renewable energy storage", DepthHint::Medium)
        .await
        .unwrap();
    answer_all(&state, &session.id).await;

    let mut progress = state.orchestrator.hub().subscribe(&session.id, 0).await;
    state.runner.start(&session.id).unwrap();

    let mut notices = Vec::new();
    while let Some((_, notice)) = progress.next().await {
        notices.push(notice);
    }
    state.runner.wait(&session.id).await;

    let session = state.orchestrator.get_session(&session.id).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.clarification_answers.as_ref().unwrap().len(), 4);

    let plan = session.search_plan.as_ref().unwrap();
    let results = session.search_results.as_ref().unwrap();
    assert!(results.results.len() <= plan.queries.len() * 2);

    let curated = session.curated_context.as_ref().unwrap();
    assert!(!curated.content.is_empty());
    assert!(session.evaluation_result.as_ref().unwrap().is_sufficient);

    let report = session.final_report().unwrap();
    assert!(!report.title.is_empty());
    assert_eq!(report.sections.len(), 2);
    for section in &report.sections {
        for index in &section.references {
            assert!(report.references.iter().any(|r| r.index == *index));
        }
    }

    // PDFs never reach the fetcher
    let fetched = retriever.fetched.lock().unwrap().clone();
    assert_eq!(fetched.len(), plan.queries.len());
    assert!(fetched.iter().all(|u| !u.ends_with(".pdf")));
    assert!(
        results
            .results
            .iter()
            .filter(|r| r.url.ends_with(".pdf"))
            .all(|r| r.content.starts_with("[This is a document/binary file:"))
    );

    let links = notices
        .iter()
        .filter(|n| matches!(n, Notice::Detail { detail_type: DetailKind::Link, .. }))
        .count();
    assert_eq!(links, plan.queries.len());
    assert!(matches!(notices.last(), Some(Notice::Completed { .. })));
}

#[tokio::test]
async fn test_always_insufficient_still_completes() {
    let llm = Arc::new(StageLlm::new(false));
    let state = app(llm.clone(), Arc::new(TwoHitRetriever::new()));

    let session = state
        .orchestrator
        .create_session("renewable energy storage", DepthHint::Basic)
        .await
        .unwrap();
    answer_all(&state, &session.id).await;

    state.runner.start(&session.id).unwrap();
    state.runner.wait(&session.id).await;

    let session = state.orchestrator.get_session(&session.id).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.iterations, state.config.research.max_iterations);
    assert!(session.final_report().unwrap().metadata.iterations <= state.config.research.max_iterations);
    assert_eq!(
        llm.calls_containing("research evaluator") as u32,
        state.config.research.max_iterations - 1
    );
}

#[tokio::test]
async fn test_clarification_generated_once() {
    let llm = Arc::new(StageLlm::new(true));
    let state = app(llm.clone(), Arc::new(TwoHitRetriever::new()));

    let session = state
        .orchestrator
        .create_session("renewable energy storage", DepthHint::Deep)
        .await
        .unwrap();

    let first = state.orchestrator.request_clarification(&session.id).await.unwrap();
    let second = state.orchestrator.request_clarification(&session.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(llm.calls_containing("clarifying research topics"), 1);
}

#[tokio::test]
async fn test_report_stream_after_completion() {
    let llm = Arc::new(StageLlm::new(true));
    let state = app(llm, Arc::new(TwoHitRetriever::new()));

    let session = state
        .orchestrator
        .create_session("renewable energy storage", DepthHint::Basic)
        .await
        .unwrap();
    answer_all(&state, &session.id).await;
    state.runner.start(&session.id).unwrap();
    state.runner.wait(&session.id).await;

    let mut stream = state.orchestrator.start_report_stream(&session.id).await.unwrap();
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        if let StreamChunk::TextDelta(delta) = chunk {
            text.push_str(&delta);
        }
    }
    assert_eq!(text, "Free-form report text.");
}
