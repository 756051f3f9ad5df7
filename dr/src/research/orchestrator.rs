//! Orchestrator - the research state machine
//!
//! Every mutation of a session goes through here. User-triggered transitions
//! (clarification, answers) are methods called by the API; the internal
//! transitions run one at a time through `advance`, which executes the stage
//! for the current state, persists the outcome and emits progress.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::artifacts::ClarificationQuestion;
use super::stages::{self, report::STREAM_SYSTEM};
use super::{DepthHint, ResearchContext, ResearchError, ResearchSession, SessionState, SessionStatus};
use crate::llm::StreamChunk;
use crate::progress::{ProgressEmitter, ProgressHub};
use crate::store::SessionStore;

/// Drives research sessions through their stages
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    hub: ProgressHub,
    ctx: ResearchContext,
    /// Serializes clarification generation per session
    clarification_locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn SessionStore>, hub: ProgressHub, ctx: ResearchContext) -> Self {
        debug!(max_iterations = ctx.research.max_iterations, "Orchestrator::new: called");
        Self {
            store,
            hub,
            ctx,
            clarification_locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    pub fn context(&self) -> &ResearchContext {
        &self.ctx
    }

    /// Register a new session in `clarification_needed`
    pub async fn create_session(&self, topic: &str, depth: DepthHint) -> Result<ResearchSession, ResearchError> {
        debug!(%topic, %depth, "create_session: called");
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ResearchError::InvalidInput("topic must not be empty".to_string()));
        }

        let session = self.store.create(ResearchSession::new(topic, depth)).await?;
        self.hub.seed(&session).await;
        info!(session_id = %session.id, %topic, "create_session: session created");
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> Result<ResearchSession, ResearchError> {
        Ok(self.store.get(id).await?)
    }

    pub async fn list_sessions(&self) -> Result<Vec<ResearchSession>, ResearchError> {
        Ok(self.store.list().await?)
    }

    fn clarification_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .clarification_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Questions for the session, generating them on first request
    ///
    /// Repeated and concurrent requests return the same cached questions.
    /// A generation failure leaves the session in `clarification_needed`.
    pub async fn request_clarification(&self, id: &str) -> Result<Vec<ClarificationQuestion>, ResearchError> {
        debug!(session_id = %id, "request_clarification: called");
        let session = self.store.get(id).await?;
        if let Some(questions) = &session.clarification_questions {
            return Ok(questions.clone());
        }

        let lock = self.clarification_lock(id);
        let _guard = lock.lock().await;

        // Another request may have finished while this one waited
        let mut session = self.store.get(id).await?;
        if let Some(questions) = &session.clarification_questions {
            debug!(session_id = %id, "request_clarification: generated by concurrent request");
            return Ok(questions.clone());
        }
        if session.status() != SessionStatus::ClarificationNeeded {
            return Err(ResearchError::wrong_state(id, session.status(), "clarification is not pending"));
        }

        let questions = stages::generate_questions(&self.ctx, &session.topic, session.depth_hint).await?;
        session.clarification_questions = Some(questions.clone());
        session.state = SessionState::AwaitingClarification;

        let updated = self.store.update(session).await?;
        self.hub.emitter_for(id).session_state(&updated).await;
        info!(session_id = %id, count = questions.len(), "request_clarification: questions ready");
        Ok(questions)
    }

    /// Store the user's answers and move to `generating_plan`
    ///
    /// The caller is responsible for starting the stage chain.
    pub async fn submit_answers(
        &self,
        id: &str,
        answers: BTreeMap<String, String>,
    ) -> Result<ResearchSession, ResearchError> {
        debug!(session_id = %id, count = answers.len(), "submit_answers: called");
        let mut session = self.store.get(id).await?;
        if session.status() != SessionStatus::AwaitingClarification {
            return Err(ResearchError::wrong_state(id, session.status(), "not awaiting clarification answers"));
        }

        session.clarification_answers = Some(answers);
        session.state = SessionState::GeneratingPlan { followup: None };

        let updated = self.store.update(session).await?;
        self.hub.emitter_for(id).session_state(&updated).await;
        Ok(updated)
    }

    /// Execute exactly one stage for the session and persist the outcome
    ///
    /// Returns the status after the stage. A terminal session is left as is.
    /// A stage failure moves the session to `error`; it is not returned as Err.
    pub async fn advance(&self, id: &str) -> Result<SessionStatus, ResearchError> {
        let mut session = self.store.get(id).await?;
        let from = session.status();
        debug!(session_id = %id, status = %from, "advance: called");

        match from {
            status if status.is_terminal() => return Ok(status),
            SessionStatus::ClarificationNeeded | SessionStatus::AwaitingClarification => {
                return Err(ResearchError::wrong_state(id, from, "waiting for clarification"));
            }
            _ => {}
        }

        let emitter = self.hub.emitter_for(id);
        if let Err(e) = self.run_stage(&mut session, &emitter).await {
            error!(session_id = %id, stage = %from, error = %e, "advance: stage failed");
            session.fail(format!("{} failed: {e}", from.step()));
        }

        let updated = self.store.update(session).await?;
        emitter.session_state(&updated).await;
        info!(session_id = %id, from = %from, to = %updated.status(), "advance: transition");
        Ok(updated.status())
    }

    async fn run_stage(&self, session: &mut ResearchSession, emitter: &ProgressEmitter) -> Result<(), ResearchError> {
        match session.state.clone() {
            SessionState::GeneratingPlan { followup } => {
                let plan = match followup {
                    Some(plan) => plan,
                    None => stages::generate_plan(&self.ctx, session).await?,
                };
                session.search_plan = Some(plan);
                session.state = SessionState::SearchingWeb;
            }
            SessionState::SearchingWeb => {
                let plan = session
                    .search_plan
                    .clone()
                    .ok_or_else(|| ResearchError::Stage("no search plan".to_string()))?;
                for query in &plan.queries {
                    emitter.link(query).await;
                }
                session.search_results = Some(stages::search_web(&self.ctx, &plan).await?);
                session.state = SessionState::CuratingContext;
            }
            SessionState::CuratingContext => {
                let results = session
                    .search_results
                    .clone()
                    .ok_or_else(|| ResearchError::Stage("no search results".to_string()))?;
                for result in &results.results {
                    emitter.curation(&result.title).await;
                }
                session.curated_context = Some(stages::curate(&self.ctx, &results).await?);
                session.state = SessionState::Evaluating;
            }
            SessionState::Evaluating => {
                let iteration = session.iterations + 1;
                let evaluation = stages::evaluate(&self.ctx, session, iteration).await;
                session.iterations = iteration;

                session.state = if evaluation.is_sufficient || iteration >= self.ctx.research.max_iterations {
                    SessionState::GeneratingReport
                } else {
                    let plan = stages::followup_plan(&evaluation, &session.topic, iteration);
                    debug!(session_id = %session.id, queries = plan.queries.len(), "run_stage: follow-up plan");
                    SessionState::GeneratingPlan { followup: Some(plan) }
                };
                session.evaluation_result = Some(evaluation);
            }
            SessionState::GeneratingReport => {
                let curated = session
                    .curated_context
                    .clone()
                    .ok_or_else(|| ResearchError::Stage("no curated context".to_string()))?;
                let report = stages::generate_report(&self.ctx, session, &curated, emitter).await?;
                session.state = SessionState::Completed {
                    report: Box::new(report),
                };
            }
            other => {
                warn!(session_id = %session.id, status = %other.status(), "run_stage: no stage for state");
            }
        }
        Ok(())
    }

    /// Move a running session to `error`; terminal sessions are left alone
    pub async fn fail_session(&self, id: &str, message: &str) -> Result<(), ResearchError> {
        debug!(session_id = %id, %message, "fail_session: called");
        let mut session = self.store.get(id).await?;
        if session.is_terminal() {
            return Ok(());
        }
        session.fail(message);
        let updated = self.store.update(session).await?;
        self.hub.emitter_for(id).session_state(&updated).await;
        Ok(())
    }

    /// Drop terminal sessions older than `retention` along with their logs
    pub async fn evict_expired(&self, retention: Duration) -> Result<Vec<String>, ResearchError> {
        let evicted = self.store.evict_expired(retention).await?;
        for id in &evicted {
            self.hub.remove(id).await;
            self.clarification_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(id);
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "evict_expired: sessions evicted");
        }
        Ok(evicted)
    }

    /// Stream free-form report prose over the session's curated context
    pub async fn start_report_stream(&self, id: &str) -> Result<ReportStream, ResearchError> {
        debug!(session_id = %id, "start_report_stream: called");
        let session = self.store.get(id).await?;
        let status = session.status();
        let curated = match (&session.curated_context, status) {
            (Some(curated), SessionStatus::GeneratingReport | SessionStatus::Completed) => curated,
            _ => return Err(ResearchError::wrong_state(id, status, "no curated context to report on")),
        };

        let prompt = stages::stream_prompt(&self.ctx, &session.topic, curated)?;
        let generator = self.ctx.generator.clone();
        let (tx, rx) = mpsc::channel(64);

        let task = tokio::spawn(async move {
            if let Err(e) = generator.stream_text(STREAM_SYSTEM, &prompt, tx.clone()).await {
                warn!(error = %e, "start_report_stream: generation failed");
                let _ = tx.send(StreamChunk::Error(e.to_string())).await;
            }
        });

        Ok(ReportStream { rx, task })
    }
}

/// Chunks of a streamed report; dropping it stops generation
pub struct ReportStream {
    rx: mpsc::Receiver<StreamChunk>,
    task: JoinHandle<()>,
}

impl ReportStream {
    pub async fn next(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }
}

impl Drop for ReportStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
