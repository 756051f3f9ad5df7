//! Context curation: per-query summaries, numbered sources and an outline

use serde_json::json;
use tracing::{debug, info, warn};

use super::sample;
use crate::research::artifacts::{CuratedContext, Outline, SearchResult, SearchResults, Source};
use crate::research::{ResearchContext, ResearchError};
use crate::search::is_placeholder;

pub(crate) const SUMMARY_SYSTEM: &str = "You are an expert research curator. \
Your task is to analyze search results and extract the most relevant information, \
organizing it into a coherent summary. Be concise and focus on key information.";

pub(crate) const OUTLINE_SYSTEM: &str = "You are an expert research content analyzer. \
Your task is to analyze research content and identify its main topics, subtopics and key points.";

const CONTENT_LIMIT: usize = 2000;
const OUTLINE_SAMPLE: usize = 2000;
const SUMMARY_UNAVAILABLE: &str = "[Unable to generate summary]";
const NO_RESULTS: &str =
    "## No valid search results\n\nThe search did not return any valid results that could be processed.";

/// Summarize search results into a curated context
///
/// Summary and outline failures degrade to placeholder text and the
/// fallback outline; only a prompt rendering failure is an error.
pub async fn curate(ctx: &ResearchContext, results: &SearchResults) -> Result<CuratedContext, ResearchError> {
    debug!(
        results = results.results.len(),
        queries = results.query_mapping.len(),
        "curate: called"
    );
    let sources = assign_sources(&results.results);

    let mut summaries = Vec::new();
    for group in &results.query_mapping {
        if group.result_indices.is_empty() {
            continue;
        }
        let context = group
            .result_indices
            .iter()
            .filter_map(|i| results.results.get(*i).map(|r| (*i, r)))
            .map(|(i, r)| format_part(i as u32 + 1, r))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = ctx.prompts.render("summary", &json!({"query": group.query, "context": context}))?;
        let summary = match ctx.generator.generate_text(SUMMARY_SYSTEM, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(query = %group.query, error = %e, "curate: summary failed");
                SUMMARY_UNAVAILABLE.to_string()
            }
        };
        summaries.push(format!("## Information for: {}\n\n{summary}", group.query));
    }

    let content = if summaries.is_empty() {
        NO_RESULTS.to_string()
    } else {
        summaries.join("\n\n")
    };

    let structure = outline(ctx, &content).await?;
    info!(
        sources = sources.len(),
        topics = structure.main_topics.len(),
        "curate: context ready"
    );
    Ok(CuratedContext {
        content,
        sources,
        structure,
    })
}

/// One numbered source per result, starting at 1, in result order
pub fn assign_sources(results: &[SearchResult]) -> Vec<Source> {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| Source {
            index: i as u32 + 1,
            url: r.url.clone(),
            title: r.title.clone(),
        })
        .collect()
}

/// Text handed to the summarizer for one result
fn format_part(index: u32, result: &SearchResult) -> String {
    let text = if result.content.trim().is_empty() || is_placeholder(&result.content) {
        result.snippet.clone()
    } else {
        sample(&result.content.replace('\0', ""), CONTENT_LIMIT)
    };
    format!("[{index}] {}\nURL: {}\n{text}", result.title, result.url)
}

async fn outline(ctx: &ResearchContext, content: &str) -> Result<Outline, ResearchError> {
    let prompt = ctx
        .prompts
        .render("outline", &json!({"content": sample(content, OUTLINE_SAMPLE)}))?;
    let schema = json!({
        "type": "object",
        "properties": {
            "main_topics": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "subtopics": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "title": {"type": "string"},
                                    "key_points": {"type": "array", "items": {"type": "string"}}
                                }
                            }
                        }
                    },
                    "required": ["title"]
                }
            }
        },
        "required": ["main_topics"]
    });

    match ctx.generator.generate_structured::<Outline>(OUTLINE_SYSTEM, &prompt, &schema).await {
        Ok(outline) => Ok(outline.sanitized().unwrap_or_else(|| {
            warn!("outline: no usable topics, using fallback");
            Outline::fallback()
        })),
        Err(e) => {
            warn!(error = %e, "outline: generation failed, using fallback");
            Ok(Outline::fallback())
        }
    }
}
