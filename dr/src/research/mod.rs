//! Research sessions and the state machine that drives them

pub mod artifacts;
mod context;
mod error;
mod orchestrator;
mod runner;
mod session;
pub mod stages;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::{
    ClarificationQuestion, CuratedContext, EvaluationResult, FinalReport, Outline, QaPair, Reference,
    ReportMetadata, ReportSection, SearchPlan, SearchResult, SearchResults, Source,
};
pub use context::ResearchContext;
pub use error::ResearchError;
pub use orchestrator::{Orchestrator, ReportStream};
pub use runner::{ResearchRunner, spawn_sweeper};
pub use session::{DepthHint, ResearchSession, SessionState, SessionStatus, SessionSummary};
