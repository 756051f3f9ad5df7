//! Session storage
//!
//! The orchestrator reads and writes sessions only through `SessionStore`.
//! Updates are compare-and-swap on `revision`, so two writers racing on one
//! session cannot silently overwrite each other.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod memory;

pub use memory::MemoryStore;

use crate::research::ResearchSession;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    #[error("Revision conflict on {id}: expected {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },

    #[error("Channel error")]
    ChannelError,
}

/// Keyed storage of research sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: ResearchSession) -> Result<ResearchSession, StoreError>;

    async fn get(&self, id: &str) -> Result<ResearchSession, StoreError>;

    /// Replace a session if its `revision` matches the stored one
    ///
    /// Returns the stored copy with the bumped revision and fresh `updated_at`.
    async fn update(&self, session: ResearchSession) -> Result<ResearchSession, StoreError>;

    /// All sessions, oldest first
    async fn list(&self) -> Result<Vec<ResearchSession>, StoreError>;

    /// Drop terminal sessions not updated within `retention`; returns their ids
    async fn evict_expired(&self, retention: Duration) -> Result<Vec<String>, StoreError>;
}
