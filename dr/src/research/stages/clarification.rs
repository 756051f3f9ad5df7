//! Clarification questions for a new topic

use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::research::artifacts::ClarificationQuestion;
use crate::research::{DepthHint, ResearchContext, ResearchError};

pub(crate) const SYSTEM: &str = "You are an expert research assistant tasked with clarifying research topics. \
Your goal is to ask precise questions that will help narrow down and better understand the research needs. \
Ask only questions that would significantly improve the research process.";

#[derive(Debug, Deserialize)]
struct QuestionsReply {
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    question: String,
}

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "questions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "question": {"type": "string"}
                    },
                    "required": ["id", "question"]
                }
            }
        },
        "required": ["questions"]
    })
}

/// Ask the generator for clarification questions about `topic`
///
/// Empty questions are dropped, ids are made unique, and the list is capped
/// at `max-questions`. Fewer than `min-questions` usable questions is an error.
pub async fn generate_questions(
    ctx: &ResearchContext,
    topic: &str,
    depth: DepthHint,
) -> Result<Vec<ClarificationQuestion>, ResearchError> {
    debug!(%topic, %depth, "generate_questions: called");
    let prompt = ctx.prompts.render(
        "clarification",
        &json!({
            "topic": topic,
            "depth": depth.as_str(),
            "min_questions": ctx.research.min_questions.max(4).min(ctx.research.max_questions),
            "max_questions": ctx.research.max_questions,
        }),
    )?;

    let reply: QuestionsReply = ctx.generator.generate_structured(SYSTEM, &prompt, &schema()).await?;
    let questions = normalize(reply.questions, ctx.research.max_questions);

    if questions.len() < ctx.research.min_questions {
        warn!(count = questions.len(), "generate_questions: too few questions");
        return Err(ResearchError::Stage(format!(
            "generator returned {} usable clarification questions",
            questions.len()
        )));
    }
    Ok(questions)
}

fn normalize(raw: Vec<RawQuestion>, max: usize) -> Vec<ClarificationQuestion> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|q| {
            let question = q.question.trim().to_string();
            if question.is_empty() {
                return None;
            }
            let id = match q.id {
                Some(serde_json::Value::String(s)) => s.trim().to_string(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            let id = if id.is_empty() || seen.contains(&id) {
                Uuid::now_v7().to_string()
            } else {
                id
            };
            seen.insert(id.clone());
            Some(ClarificationQuestion { id, question })
        })
        .take(max)
        .collect()
}
