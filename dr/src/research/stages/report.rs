//! Report generation: title, introduction, one section per outline topic,
//! conclusion and the reference list

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::progress::{ProgressEmitter, REPORT_PROGRESS};
use crate::research::artifacts::{
    CuratedContext, FinalReport, QaPair, Reference, ReportMetadata, ReportSection, Topic,
};
use crate::research::{ResearchContext, ResearchError, ResearchSession};

pub(crate) const TITLE_SYSTEM: &str = "You are an expert at creating effective titles for research reports.";
pub(crate) const INTRODUCTION_SYSTEM: &str =
    "You are an expert at writing clear, engaging introductions for research reports.";
pub(crate) const SECTION_SYSTEM: &str =
    "You are an expert at writing detailed, informative sections for research reports. Cite sources by index.";
pub(crate) const CONCLUSION_SYSTEM: &str = "You are an expert at writing effective conclusions for research reports.";
pub(crate) const STREAM_SYSTEM: &str = "You are an expert research report writer. \
Write a well-structured markdown document that cites sources by their bracketed index.";

#[derive(Debug, Deserialize)]
struct TitleReply {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct IntroductionReply {
    #[serde(default)]
    introduction: String,
}

#[derive(Debug, Deserialize)]
struct SectionReply {
    #[serde(default)]
    content: String,
    #[serde(default)]
    references: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ConclusionReply {
    #[serde(default)]
    conclusion: String,
}

#[derive(Serialize)]
struct SourceLine<'a> {
    index: u32,
    title: &'a str,
}

#[derive(Serialize)]
struct SectionPrompt<'a> {
    report_title: &'a str,
    section_title: &'a str,
    key_points: Vec<&'a str>,
    content: &'a str,
    sources: Vec<SourceLine<'a>>,
}

#[derive(Serialize)]
struct IntroductionPrompt<'a> {
    report_title: &'a str,
    topic: &'a str,
    answers: Vec<QaPair>,
    section_titles: &'a [String],
}

fn text_schema(field: &str) -> Value {
    json!({
        "type": "object",
        "properties": { field: {"type": "string"} },
        "required": [field]
    })
}

/// Produce the final report from curated context
///
/// A report-progress notice is emitted before each part. A missing title
/// falls back to a generic one; failures in any other part are fatal.
pub async fn generate_report(
    ctx: &ResearchContext,
    session: &ResearchSession,
    curated: &CuratedContext,
    emitter: &ProgressEmitter,
) -> Result<FinalReport, ResearchError> {
    debug!(session_id = %session.id, "generate_report: called");
    let [title_step, intro_step, sections_step, conclusion_step, references_step] = REPORT_PROGRESS;
    let answers = session.qa_pairs();

    emitter.report_part(title_step).await;
    let title = generate_title(ctx, &session.topic, &answers).await?;

    let topics: Vec<&Topic> = curated.structure.main_topics.iter().collect();
    let section_titles: Vec<String> = topics.iter().map(|t| t.title.clone()).collect();

    emitter.report_part(intro_step).await;
    let prompt = ctx.prompts.render(
        "introduction",
        &IntroductionPrompt {
            report_title: &title,
            topic: &session.topic,
            answers,
            section_titles: &section_titles,
        },
    )?;
    let reply: IntroductionReply = ctx
        .generator
        .generate_structured(INTRODUCTION_SYSTEM, &prompt, &text_schema("introduction"))
        .await?;
    let introduction = non_empty(reply.introduction, "introduction")?;

    emitter.report_part(sections_step).await;
    let mut sections = Vec::with_capacity(topics.len());
    for topic in topics {
        sections.push(generate_section(ctx, &title, topic, curated).await?);
    }

    emitter.report_part(conclusion_step).await;
    let prompt = ctx.prompts.render(
        "conclusion",
        &json!({"report_title": &title, "section_titles": &section_titles}),
    )?;
    let reply: ConclusionReply = ctx
        .generator
        .generate_structured(CONCLUSION_SYSTEM, &prompt, &text_schema("conclusion"))
        .await?;
    let conclusion = non_empty(reply.conclusion, "conclusion")?;

    emitter.report_part(references_step).await;
    let references = collect_references(&sections, curated);

    info!(
        session_id = %session.id,
        sections = sections.len(),
        references = references.len(),
        "generate_report: report ready"
    );
    let sources_count = references.len();
    Ok(FinalReport {
        title,
        introduction,
        sections,
        conclusion,
        references,
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            topic: session.topic.clone(),
            sources_count,
            iterations: session.iterations,
            confidence_score: session.evaluation_result.as_ref().map(|e| e.confidence_score),
        },
    })
}

async fn generate_title(ctx: &ResearchContext, topic: &str, answers: &[QaPair]) -> Result<String, ResearchError> {
    let prompt = ctx.prompts.render("title", &json!({"topic": topic, "answers": answers}))?;
    let title = match ctx
        .generator
        .generate_structured::<TitleReply>(TITLE_SYSTEM, &prompt, &text_schema("title"))
        .await
    {
        Ok(reply) => reply.title.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "generate_title: falling back to default title");
            String::new()
        }
    };
    Ok(if title.is_empty() {
        format!("Research Report: {topic}")
    } else {
        title
    })
}

async fn generate_section(
    ctx: &ResearchContext,
    report_title: &str,
    topic: &Topic,
    curated: &CuratedContext,
) -> Result<ReportSection, ResearchError> {
    debug!(section = %topic.title, "generate_section: called");
    let key_points = topic
        .subtopics
        .iter()
        .flat_map(|s| std::iter::once(s.title.as_str()).chain(s.key_points.iter().map(String::as_str)))
        .filter(|p| !p.trim().is_empty())
        .collect();

    let prompt = ctx.prompts.render(
        "section",
        &SectionPrompt {
            report_title,
            section_title: &topic.title,
            key_points,
            content: &curated.content,
            sources: curated
                .sources
                .iter()
                .map(|s| SourceLine {
                    index: s.index,
                    title: &s.title,
                })
                .collect(),
        },
    )?;

    let schema = json!({
        "type": "object",
        "properties": {
            "content": {"type": "string"},
            "references": {"type": "array", "items": {"type": "integer"}}
        },
        "required": ["content", "references"]
    });
    let reply: SectionReply = ctx.generator.generate_structured(SECTION_SYSTEM, &prompt, &schema).await?;

    let references: BTreeSet<u32> = reply
        .references
        .iter()
        .filter_map(parse_reference)
        .filter(|i| curated.source(*i).is_some())
        .collect();

    Ok(ReportSection {
        title: topic.title.clone(),
        content: non_empty(reply.content, "section")?,
        references: references.into_iter().collect(),
    })
}

/// Source index from a model-written reference: `3`, `"3"` or `"[3]"`
pub fn parse_reference(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().trim_start_matches('[').trim_end_matches(']').trim().parse().ok(),
        _ => None,
    }
}

/// Every source cited by some section, by index
fn collect_references(sections: &[ReportSection], curated: &CuratedContext) -> Vec<Reference> {
    let cited: BTreeSet<u32> = sections.iter().flat_map(|s| s.references.iter().copied()).collect();
    cited
        .into_iter()
        .filter_map(|i| curated.source(i))
        .map(|s| Reference {
            index: s.index,
            title: s.title.clone(),
            url: s.url.clone(),
        })
        .collect()
}

fn non_empty(text: String, part: &str) -> Result<String, ResearchError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ResearchError::Stage(format!("generator returned an empty {part}")));
    }
    Ok(text.to_string())
}

/// Prompt for the free-form streamed report
pub fn stream_prompt(ctx: &ResearchContext, topic: &str, curated: &CuratedContext) -> Result<String, ResearchError> {
    let mut content = curated.content.clone();
    if !curated.sources.is_empty() {
        content.push_str("\n\nSources:\n");
        for s in &curated.sources {
            content.push_str(&format!("[{}] {} ({})\n", s.index, s.title, s.url));
        }
    }
    Ok(ctx
        .prompts
        .render("report-stream", &json!({"topic": topic, "content": content}))?)
}
