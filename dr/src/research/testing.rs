//! Test doubles shared by stage and orchestrator tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::ResearchContext;
use super::stages::{clarification, curation, evaluation, plan, report};
use crate::config::Config;
use crate::llm::{CompletionRequest, Generator, LlmClient, LlmError};
use crate::prompts::PromptLoader;
use crate::search::{SearchError, SearchHit, WebRetriever};

/// Retriever returning `per_query` synthetic hits for every query
pub struct StubRetriever {
    per_query: usize,
    shared_url: bool,
    fail_all: bool,
    failing: HashSet<String>,
    canned: HashMap<String, Vec<SearchHit>>,
    searches: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl StubRetriever {
    pub fn new(per_query: usize) -> Self {
        Self {
            per_query,
            shared_url: false,
            fail_all: false,
            failing: HashSet::new(),
            canned: HashMap::new(),
            searches: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Every query also returns the same extra URL
    pub fn with_shared_url(mut self) -> Self {
        self.shared_url = true;
        self
    }

    pub fn with_hits(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.canned.insert(query.to_string(), hits);
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn failing_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("fetched lock").clone()
    }
}

#[async_trait]
impl WebRetriever for StubRetriever {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || self.failing.contains(query) {
            return Err(SearchError::InvalidResponse(format!("stub failure for {query}")));
        }
        if let Some(hits) = self.canned.get(query) {
            return Ok(hits.clone());
        }

        let slug = query.replace(' ', "-");
        let mut hits: Vec<SearchHit> = (0..self.per_query.min(count))
            .map(|i| SearchHit {
                url: format!("https://example.com/{slug}/{i}"),
                title: format!("Result {i} for {query}"),
                snippet: format!("Snippet {i} for {query}"),
            })
            .collect();
        if self.shared_url {
            hits.push(SearchHit {
                url: "https://example.com/shared".to_string(),
                title: "Shared result".to_string(),
                snippet: "Shared snippet".to_string(),
            });
        }
        Ok(hits)
    }

    async fn fetch(&self, url: &str) -> String {
        self.fetched.lock().expect("fetched lock").push(url.to_string());
        format!("Page text for {url}")
    }
}

/// Responder that answers every stage prompt with a well-formed reply
pub fn happy_responder(req: &CompletionRequest) -> Result<String, LlmError> {
    let system = req.system_prompt.as_str();
    let reply = if system == clarification::SYSTEM {
        r#"{"questions": [
            {"id": "q1", "question": "Which region matters most?"},
            {"id": "q2", "question": "Which timeframe?"},
            {"id": "q3", "question": "Which storage technologies?"},
            {"id": "q4", "question": "Who is the audience?"}
        ]}"#
    } else if system == plan::SYSTEM {
        r#"{"queries": ["battery chemistry", "pumped hydro capacity", "storage costs"]}"#
    } else if system == curation::SUMMARY_SYSTEM {
        "Storage capacity grew quickly [1]."
    } else if system == curation::OUTLINE_SYSTEM {
        r#"{"main_topics": [
            {"title": "Technologies", "subtopics": [{"title": "Batteries", "key_points": ["density"]}]},
            {"title": "Economics", "subtopics": []}
        ]}"#
    } else if system == evaluation::SYSTEM {
        r#"{"is_sufficient": true, "missing_aspects": [], "additional_queries": [], "confidence_score": 0.9}"#
    } else if system == report::TITLE_SYSTEM {
        r#"{"title": "The State of Energy Storage"}"#
    } else if system == report::INTRODUCTION_SYSTEM {
        r#"{"introduction": "Storage is central to the grid."}"#
    } else if system == report::SECTION_SYSTEM {
        r#"{"content": "Findings as reported [1].", "references": [1, "[2]", 99]}"#
    } else if system == report::CONCLUSION_SYSTEM {
        r#"{"conclusion": "Storage keeps growing."}"#
    } else if system == report::STREAM_SYSTEM {
        "# Streamed report\n\nStorage keeps growing [1]."
    } else {
        return Err(LlmError::InvalidResponse(format!("unexpected system prompt: {system}")));
    };
    Ok(reply.to_string())
}

/// Context over the given doubles with default configuration
pub fn test_context(llm: Arc<dyn LlmClient>, retriever: Arc<dyn WebRetriever>) -> ResearchContext {
    let mut config = Config::default();
    config.research.stage_pause_ms = 0;
    config.research.progress_poll_ms = 20;
    ResearchContext {
        generator: Generator::new(llm, &config.llm),
        retriever,
        prompts: Arc::new(PromptLoader::embedded_only()),
        research: config.research,
        search: config.search,
        fetch: config.fetch,
    }
}
