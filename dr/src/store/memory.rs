//! In-process session store
//!
//! An actor task owns the map; handles talk to it over an mpsc channel with
//! oneshot replies, so the map is never shared across tasks.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::{SessionStore, StoreError};
use crate::research::ResearchSession;

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

/// Commands sent to the store actor
#[derive(Debug)]
enum StoreCommand {
    Create {
        session: Box<ResearchSession>,
        reply: Reply<ResearchSession>,
    },
    Get {
        id: String,
        reply: Reply<ResearchSession>,
    },
    Update {
        session: Box<ResearchSession>,
        reply: Reply<ResearchSession>,
    },
    List {
        reply: Reply<Vec<ResearchSession>>,
    },
    EvictExpired {
        retention: Duration,
        reply: Reply<Vec<String>>,
    },
    Shutdown,
}

/// Handle to the in-memory store actor
#[derive(Clone)]
pub struct MemoryStore {
    tx: mpsc::Sender<StoreCommand>,
}

impl MemoryStore {
    /// Spawn a new store actor
    pub fn spawn() -> Self {
        debug!("MemoryStore::spawn: called");
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(rx));
        info!("MemoryStore spawned");
        Self { tx }
    }

    /// Stop the actor; later calls fail with `ChannelError`
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        debug!("MemoryStore::shutdown: called");
        self.tx
            .send(StoreCommand::Shutdown)
            .await
            .map_err(|_| StoreError::ChannelError)
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> StoreCommand) -> Result<T, StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: ResearchSession) -> Result<ResearchSession, StoreError> {
        debug!(session_id = %session.id, "MemoryStore::create: called");
        self.request(|reply| StoreCommand::Create {
            session: Box::new(session),
            reply,
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<ResearchSession, StoreError> {
        debug!(%id, "MemoryStore::get: called");
        self.request(|reply| StoreCommand::Get {
            id: id.to_string(),
            reply,
        })
        .await
    }

    async fn update(&self, session: ResearchSession) -> Result<ResearchSession, StoreError> {
        debug!(session_id = %session.id, revision = session.revision, status = %session.status(), "MemoryStore::update: called");
        self.request(|reply| StoreCommand::Update {
            session: Box::new(session),
            reply,
        })
        .await
    }

    async fn list(&self) -> Result<Vec<ResearchSession>, StoreError> {
        debug!("MemoryStore::list: called");
        self.request(|reply| StoreCommand::List { reply }).await
    }

    async fn evict_expired(&self, retention: Duration) -> Result<Vec<String>, StoreError> {
        debug!(?retention, "MemoryStore::evict_expired: called");
        self.request(|reply| StoreCommand::EvictExpired { retention, reply })
            .await
    }
}

/// The actor loop that owns the session map and processes commands
async fn actor_loop(mut rx: mpsc::Receiver<StoreCommand>) {
    debug!("MemoryStore actor started");
    let mut sessions: HashMap<String, ResearchSession> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::Create { session, reply } => {
                debug!(session_id = %session.id, "actor_loop: Create command");
                let result = if sessions.contains_key(&session.id) {
                    Err(StoreError::AlreadyExists(session.id.clone()))
                } else {
                    sessions.insert(session.id.clone(), (*session).clone());
                    Ok(*session)
                };
                let _ = reply.send(result);
            }

            StoreCommand::Get { id, reply } => {
                debug!(%id, "actor_loop: Get command");
                let result = sessions.get(&id).cloned().ok_or(StoreError::NotFound(id));
                let _ = reply.send(result);
            }

            StoreCommand::Update { session, reply } => {
                debug!(session_id = %session.id, "actor_loop: Update command");
                let result = match sessions.get_mut(&session.id) {
                    None => Err(StoreError::NotFound(session.id.clone())),
                    Some(stored) if stored.revision != session.revision => Err(StoreError::Conflict {
                        id: session.id.clone(),
                        expected: session.revision,
                        found: stored.revision,
                    }),
                    Some(stored) => {
                        let mut next = *session;
                        next.revision += 1;
                        next.updated_at = Utc::now();
                        *stored = next.clone();
                        Ok(next)
                    }
                };
                let _ = reply.send(result);
            }

            StoreCommand::List { reply } => {
                debug!("actor_loop: List command");
                let mut all: Vec<ResearchSession> = sessions.values().cloned().collect();
                all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
                let _ = reply.send(Ok(all));
            }

            StoreCommand::EvictExpired { retention, reply } => {
                debug!(?retention, "actor_loop: EvictExpired command");
                let cutoff = chrono::Duration::from_std(retention)
                    .ok()
                    .and_then(|r| Utc::now().checked_sub_signed(r));
                let expired: Vec<String> = match cutoff {
                    Some(cutoff) => sessions
                        .values()
                        .filter(|s| s.is_terminal() && s.updated_at < cutoff)
                        .map(|s| s.id.clone())
                        .collect(),
                    None => Vec::new(),
                };
                for id in &expired {
                    sessions.remove(id);
                }
                if !expired.is_empty() {
                    info!(count = expired.len(), "Evicted expired sessions");
                }
                let _ = reply.send(Ok(expired));
            }

            StoreCommand::Shutdown => {
                info!("MemoryStore shutting down");
                break;
            }
        }
    }

    debug!("MemoryStore actor stopped");
}
