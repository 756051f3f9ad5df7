//! Sufficiency evaluation with iteration-aware leniency

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::sample;
use crate::research::artifacts::{EvaluationResult, QaPair};
use crate::research::{ResearchContext, ResearchSession};

pub(crate) const SYSTEM: &str = "You are an expert research evaluator. \
Your task is to critically assess the completeness and quality of research content. \
Be practical: if the main aspects of the topic are covered, the research is sufficient.";

const CONTENT_SAMPLE: usize = 3000;

#[derive(Serialize)]
struct EvaluationPrompt<'a> {
    topic: &'a str,
    answers: Vec<QaPair>,
    content: String,
    iteration: u32,
    lenient: bool,
    very_lenient: bool,
}

/// Judge whether the session's curated context is enough for a report
///
/// `iteration` is the 1-based cycle being evaluated. At the iteration
/// ceiling a sufficient verdict is returned without asking the model, and
/// any evaluator failure yields the fallback verdict, so this never fails.
pub async fn evaluate(ctx: &ResearchContext, session: &ResearchSession, iteration: u32) -> EvaluationResult {
    debug!(session_id = %session.id, iteration, "evaluate: called");
    let research = &ctx.research;
    if iteration >= research.max_iterations {
        info!(session_id = %session.id, iteration, "evaluate: iteration ceiling reached");
        return EvaluationResult::forced();
    }

    let content = session
        .curated_context
        .as_ref()
        .map(|c| sample(&c.content, CONTENT_SAMPLE))
        .unwrap_or_default();

    let prompt = match ctx.prompts.render(
        "evaluation",
        &EvaluationPrompt {
            topic: &session.topic,
            answers: session.qa_pairs(),
            content,
            iteration,
            lenient: iteration >= research.lenient_after,
            very_lenient: iteration >= research.very_lenient_after,
        },
    ) {
        Ok(prompt) => prompt,
        Err(e) => {
            warn!(error = %e, "evaluate: prompt rendering failed");
            return EvaluationResult::fallback();
        }
    };

    let schema = json!({
        "type": "object",
        "properties": {
            "is_sufficient": {"type": "boolean"},
            "missing_aspects": {"type": "array", "items": {"type": "string"}},
            "additional_queries": {"type": "array", "items": {"type": "string"}},
            "confidence_score": {"type": "number", "minimum": 0, "maximum": 1}
        },
        "required": ["is_sufficient", "missing_aspects", "additional_queries", "confidence_score"]
    });

    match ctx
        .generator
        .generate_structured::<EvaluationResult>(SYSTEM, &prompt, &schema)
        .await
    {
        Ok(mut result) => {
            result.confidence_score = clamp_confidence(result.confidence_score);
            info!(
                session_id = %session.id,
                sufficient = result.is_sufficient,
                confidence = result.confidence_score,
                "evaluate: verdict"
            );
            result
        }
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "evaluate: evaluator failed");
            EvaluationResult::fallback()
        }
    }
}

fn clamp_confidence(score: f64) -> f64 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}
