//! DeepResearch - multi-stage web research orchestrator
//!
//! A research session moves from clarification questions through search
//! planning, web search, context curation and sufficiency evaluation (looping
//! back to planning when more material is needed) to a cited report.
//!
//! # Modules
//!
//! - [`research`] - Session model, stages, orchestrator and background runner
//! - [`llm`] - Content generator trait and OpenAI-compatible implementation
//! - [`search`] - Web search client and page fetching
//! - [`progress`] - Per-session progress logs with replay
//! - [`store`] - Session storage
//! - [`server`] - HTTP and SSE API
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod client;
pub mod config;
pub mod llm;
pub mod progress;
pub mod prompts;
pub mod research;
pub mod search;
pub mod server;
pub mod store;

pub use config::Config;
pub use llm::{Generator, LlmClient, LlmError, create_client};
pub use progress::{Notice, ProgressHub};
pub use research::{
    DepthHint, FinalReport, Orchestrator, ResearchContext, ResearchError, ResearchRunner, ResearchSession,
    SessionStatus,
};
pub use search::{SearchHit, WebRetriever};
pub use server::AppState;
pub use store::{MemoryStore, SessionStore};
