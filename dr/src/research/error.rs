//! Research error types

use thiserror::Error;

use super::SessionStatus;
use crate::llm::LlmError;
use crate::store::StoreError;

/// Errors surfaced by the orchestrator and its stages
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session {id} is {status}; {expected}")]
    WrongState {
        id: String,
        status: SessionStatus,
        expected: String,
    },

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Session {0} already has a running driver")]
    AlreadyRunning(String),

    #[error("{0}")]
    Stage(String),

    #[error("Generator error: {0}")]
    Llm(#[from] LlmError),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ResearchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ResearchError::NotFound(id),
            other => ResearchError::Store(other),
        }
    }
}

impl From<eyre::Report> for ResearchError {
    fn from(e: eyre::Report) -> Self {
        ResearchError::Prompt(e.to_string())
    }
}

impl ResearchError {
    pub fn wrong_state(id: &str, status: SessionStatus, expected: impl Into<String>) -> Self {
        ResearchError::WrongState {
            id: id.to_string(),
            status,
            expected: expected.into(),
        }
    }
}
