//! ResearchRunner - background drivers for stage chains
//!
//! One tokio task per running session calls `Orchestrator::advance` until the
//! session is terminal. A semaphore caps how many sessions run at once, and
//! the task registry refuses a second driver for the same session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Orchestrator, ResearchError};
use crate::config::StoreConfig;

#[derive(Clone)]
pub struct ResearchRunner {
    orchestrator: Orchestrator,
    semaphore: Arc<Semaphore>,
    handles: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    stage_pause: Duration,
}

impl ResearchRunner {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let research = &orchestrator.context().research;
        debug!(
            max_concurrent = research.max_concurrent_sessions,
            stage_pause_ms = research.stage_pause_ms,
            "ResearchRunner::new: called"
        );
        Self {
            semaphore: Arc::new(Semaphore::new(research.max_concurrent_sessions.max(1))),
            stage_pause: research.stage_pause(),
            handles: Arc::new(Mutex::new(HashMap::new())),
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn handles(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the driver for a session; returns immediately
    pub fn start(&self, session_id: &str) -> Result<(), ResearchError> {
        let mut handles = self.handles();
        if handles.get(session_id).is_some_and(|h| !h.is_finished()) {
            warn!(%session_id, "ResearchRunner::start: driver already running");
            return Err(ResearchError::AlreadyRunning(session_id.to_string()));
        }

        let runner = self.clone();
        let id = session_id.to_string();
        let handle = tokio::spawn(async move {
            runner.drive(&id).await;
            runner.handles().remove(&id);
        });
        handles.insert(session_id.to_string(), handle);
        info!(%session_id, "ResearchRunner::start: driver spawned");
        Ok(())
    }

    async fn drive(&self, session_id: &str) {
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%session_id, "drive: semaphore closed");
                return;
            }
        };
        debug!(%session_id, "drive: permit acquired");

        loop {
            match self.orchestrator.advance(session_id).await {
                Ok(status) if status.is_terminal() => {
                    info!(%session_id, %status, "drive: session finished");
                    return;
                }
                Ok(_) => {
                    if !self.stage_pause.is_zero() {
                        tokio::time::sleep(self.stage_pause).await;
                    }
                }
                Err(ResearchError::NotFound(_)) => {
                    warn!(%session_id, "drive: session disappeared");
                    return;
                }
                Err(e) => {
                    error!(%session_id, error = %e, "drive: advance failed");
                    if let Err(e) = self.orchestrator.fail_session(session_id, &e.to_string()).await {
                        error!(%session_id, error = %e, "drive: could not record failure");
                    }
                    return;
                }
            }
        }
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.handles().get(session_id).is_some_and(|h| !h.is_finished())
    }

    /// Wait for a session's driver to finish, if one is running
    pub async fn wait(&self, session_id: &str) {
        let handle = self.handles().remove(session_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(%session_id, error = %e, "wait: driver task ended abnormally");
            }
        }
    }

    /// Abort every running driver
    pub fn shutdown(&self) {
        let mut handles = self.handles();
        info!(count = handles.len(), "ResearchRunner::shutdown: aborting drivers");
        for (_, handle) in handles.drain() {
            handle.abort();
        }
    }
}

/// Periodically evict expired terminal sessions
pub fn spawn_sweeper(orchestrator: Orchestrator, config: StoreConfig) -> JoinHandle<()> {
    debug!(interval = ?config.sweep_interval(), "spawn_sweeper: called");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.sweep_interval());
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = orchestrator.evict_expired(config.retention()).await {
                warn!(error = %e, "sweeper: eviction failed");
            }
        }
    })
}
