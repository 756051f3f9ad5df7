//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

pub const CLARIFICATION: &str = include_str!("../../prompts/clarification.pmt");
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");
pub const SUMMARY: &str = include_str!("../../prompts/summary.pmt");
pub const OUTLINE: &str = include_str!("../../prompts/outline.pmt");
pub const EVALUATION: &str = include_str!("../../prompts/evaluation.pmt");
pub const TITLE: &str = include_str!("../../prompts/title.pmt");
pub const INTRODUCTION: &str = include_str!("../../prompts/introduction.pmt");
pub const SECTION: &str = include_str!("../../prompts/section.pmt");
pub const CONCLUSION: &str = include_str!("../../prompts/conclusion.pmt");
pub const REPORT_STREAM: &str = include_str!("../../prompts/report-stream.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        "clarification" => Some(CLARIFICATION),
        "plan" => Some(PLAN),
        "summary" => Some(SUMMARY),
        "outline" => Some(OUTLINE),
        "evaluation" => Some(EVALUATION),
        "title" => Some(TITLE),
        "introduction" => Some(INTRODUCTION),
        "section" => Some(SECTION),
        "conclusion" => Some(CONCLUSION),
        "report-stream" => Some(REPORT_STREAM),
        _ => None,
    };
    if found.is_none() {
        debug!(%name, "get_embedded: no match found");
    }
    found
}
