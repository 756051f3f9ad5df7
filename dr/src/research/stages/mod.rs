//! Research stages
//!
//! Each stage is a free function over a `ResearchContext` that reads the
//! artifacts it needs and returns the one it produces. Persisting the result
//! and moving the session along is left to the orchestrator.

pub mod clarification;
pub mod curation;
pub mod evaluation;
pub mod plan;
pub mod report;
pub mod web_search;

pub use clarification::generate_questions;
pub use curation::curate;
pub use evaluation::evaluate;
pub use plan::{followup_plan, generate_plan};
pub use report::{generate_report, stream_prompt};
pub use web_search::{merge_hits, search_web};

/// First `limit` characters of `text`
pub(crate) fn sample(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
