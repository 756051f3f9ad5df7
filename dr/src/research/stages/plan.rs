//! Search planning: initial plans and evaluator follow-ups

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::research::artifacts::{EvaluationResult, QaPair, SearchPlan};
use crate::research::{ResearchContext, ResearchError, ResearchSession};

pub(crate) const SYSTEM: &str = "You are an expert research strategist. \
Your task is to create a comprehensive research plan with specific search queries \
that will gather all the information needed on the topic.";

#[derive(Debug, Deserialize)]
struct QueriesReply {
    #[serde(default)]
    queries: Vec<String>,
}

#[derive(Serialize)]
struct PlanPrompt<'a> {
    topic: &'a str,
    depth: &'a str,
    answers: Vec<QaPair>,
    snippets: Vec<String>,
    min_queries: usize,
    max_queries: usize,
}

/// Build the initial search plan for a session
///
/// An exploratory search on the bare topic seeds the prompt with snippets;
/// when it fails the plan is generated without them.
pub async fn generate_plan(ctx: &ResearchContext, session: &ResearchSession) -> Result<SearchPlan, ResearchError> {
    debug!(session_id = %session.id, "generate_plan: called");
    let snippets = match ctx.retriever.search(&session.topic, ctx.search.exploratory_results).await {
        Ok(hits) => hits
            .into_iter()
            .map(|h| h.snippet)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "generate_plan: exploratory search failed");
            Vec::new()
        }
    };

    let (min_queries, max_queries) = session.depth_hint.query_range();
    let prompt = ctx.prompts.render(
        "plan",
        &PlanPrompt {
            topic: &session.topic,
            depth: session.depth_hint.as_str(),
            answers: session.qa_pairs(),
            snippets,
            min_queries,
            max_queries,
        },
    )?;

    let schema = json!({
        "type": "object",
        "properties": {
            "queries": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["queries"]
    });
    let reply: QueriesReply = ctx.generator.generate_structured(SYSTEM, &prompt, &schema).await?;

    let queries = normalize_queries(reply.queries, max_queries);
    if queries.is_empty() {
        return Err(ResearchError::Stage("generator returned no search queries".to_string()));
    }
    info!(session_id = %session.id, count = queries.len(), "generate_plan: plan ready");
    Ok(SearchPlan { queries, depth: 1 })
}

/// Plan for the next search cycle, from the evaluator's verdict
///
/// Uses the additional queries when there are any, otherwise one query per
/// missing aspect, otherwise the topic itself.
pub fn followup_plan(eval: &EvaluationResult, topic: &str, iterations: u32) -> SearchPlan {
    let mut queries = normalize_queries(eval.additional_queries.clone(), usize::MAX);
    if queries.is_empty() {
        queries = normalize_queries(
            eval.missing_aspects
                .iter()
                .map(|aspect| format!("{topic} {}", aspect.trim()))
                .collect(),
            usize::MAX,
        );
    }
    if queries.is_empty() {
        queries.push(topic.to_string());
    }
    SearchPlan {
        queries,
        depth: iterations + 1,
    }
}

/// Trim, drop blanks and case-insensitive duplicates, keep at most `max`
fn normalize_queries(raw: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
        .take(max)
        .collect()
}
