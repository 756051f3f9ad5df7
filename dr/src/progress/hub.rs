//! ProgressHub - per-session append-only notice logs
//!
//! Writers append through a `ProgressEmitter`; readers tail a log from an
//! offset. A watch channel per log wakes idle tailers when it grows, and a
//! poll interval wakes them anyway in case a change was missed.

use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::debug;

use super::notice::{DetailKind, Notice};
use crate::research::ResearchSession;

/// A notice together with its offset in the session log
pub type LoggedNotice = (usize, Notice);

struct SessionLog {
    entries: Vec<Notice>,
    keys: HashSet<String>,
    /// Set once a terminal notice is appended; nothing follows it
    closed: bool,
    len_tx: watch::Sender<usize>,
}

impl SessionLog {
    fn new() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            entries: Vec::new(),
            keys: HashSet::new(),
            closed: false,
            len_tx,
        }
    }

    fn push(&mut self, notice: Notice) -> Option<usize> {
        if self.closed {
            return None;
        }
        if !self.keys.insert(notice.dedup_key()) {
            return None;
        }
        self.closed = notice.is_terminal();
        self.entries.push(notice);
        self.len_tx.send_replace(self.entries.len());
        Some(self.entries.len() - 1)
    }
}

/// Registry of notice logs, one per session
#[derive(Clone)]
pub struct ProgressHub {
    logs: Arc<Mutex<HashMap<String, SessionLog>>>,
    poll: Duration,
}

impl ProgressHub {
    /// `poll` is the fallback wake-up interval for idle subscribers
    pub fn new(poll: Duration) -> Self {
        debug!(?poll, "ProgressHub::new: called");
        Self {
            logs: Arc::new(Mutex::new(HashMap::new())),
            poll,
        }
    }

    /// Append a notice unless one with the same key is already logged
    ///
    /// Returns the new entry's offset, or None when it was a duplicate or the
    /// log is already closed.
    pub async fn append(&self, session_id: &str, notice: Notice) -> Option<usize> {
        let mut logs = self.logs.lock().await;
        let offset = logs
            .entry(session_id.to_string())
            .or_insert_with(SessionLog::new)
            .push(notice);
        if let Some(offset) = offset {
            debug!(%session_id, offset, "ProgressHub::append: appended");
        }
        offset
    }

    /// Make sure a log reflects `session` when nothing has been emitted yet
    pub async fn seed(&self, session: &ResearchSession) {
        let mut logs = self.logs.lock().await;
        let log = logs.entry(session.id.clone()).or_insert_with(SessionLog::new);
        if !log.entries.is_empty() {
            return;
        }
        debug!(session_id = %session.id, status = %session.status(), "ProgressHub::seed: seeding empty log");
        for notice in notices_for(session) {
            log.push(notice);
        }
    }

    /// Copy of the log from `offset`, and whether the log is closed
    async fn read_from(&self, session_id: &str, offset: usize) -> Option<(Vec<LoggedNotice>, bool)> {
        let logs = self.logs.lock().await;
        let log = logs.get(session_id)?;
        let entries = log
            .entries
            .iter()
            .enumerate()
            .skip(offset)
            .map(|(i, n)| (i, n.clone()))
            .collect();
        Some((entries, log.closed))
    }

    /// Everything logged for a session so far
    pub async fn snapshot(&self, session_id: &str) -> Vec<Notice> {
        self.read_from(session_id, 0)
            .await
            .map(|(entries, _)| entries.into_iter().map(|(_, n)| n).collect())
            .unwrap_or_default()
    }

    /// Tail a session's log starting at `from`
    ///
    /// The stream ends after the terminal notice, or when the log is removed.
    /// An unknown session yields an empty stream and leaves no log behind.
    /// Dropping the stream stops all work for this subscriber.
    pub async fn subscribe(&self, session_id: &str, from: usize) -> BoxStream<'static, LoggedNotice> {
        debug!(%session_id, from, "ProgressHub::subscribe: called");
        let len_rx = match self.logs.lock().await.get(session_id) {
            Some(log) => log.len_tx.subscribe(),
            None => {
                debug!(%session_id, "ProgressHub::subscribe: no log for session");
                return futures::stream::empty().boxed();
            }
        };

        let tail = Tail {
            hub: self.clone(),
            session_id: session_id.to_string(),
            offset: from,
            pending: VecDeque::new(),
            len_rx,
            finished: false,
        };

        futures::stream::unfold(tail, |mut tail| async move {
            tail.next().await.map(|item| (item, tail))
        })
        .boxed()
    }

    /// Drop a session's log; active subscribers end
    pub async fn remove(&self, session_id: &str) {
        debug!(%session_id, "ProgressHub::remove: called");
        self.logs.lock().await.remove(session_id);
    }

    /// Handle bound to one session for emitting notices
    pub fn emitter_for(&self, session_id: impl Into<String>) -> ProgressEmitter {
        let session_id = session_id.into();
        debug!(%session_id, "ProgressHub::emitter_for: creating emitter");
        ProgressEmitter {
            hub: self.clone(),
            session_id,
        }
    }
}

/// Notices describing a session's current state
fn notices_for(session: &ResearchSession) -> Vec<Notice> {
    let mut notices = vec![Notice::status(session.status(), session.error().map(str::to_string))];
    if let Some(report) = session.final_report() {
        notices.push(Notice::Completed {
            report: Box::new(report.clone()),
        });
    }
    if let Some(error) = session.error() {
        notices.push(Notice::Error {
            error: error.to_string(),
        });
    }
    notices
}

struct Tail {
    hub: ProgressHub,
    session_id: String,
    offset: usize,
    pending: VecDeque<LoggedNotice>,
    len_rx: watch::Receiver<usize>,
    finished: bool,
}

impl Tail {
    async fn next(&mut self) -> Option<LoggedNotice> {
        loop {
            if let Some((offset, notice)) = self.pending.pop_front() {
                self.finished = notice.is_terminal();
                return Some((offset, notice));
            }
            if self.finished {
                return None;
            }

            let (entries, closed) = self.hub.read_from(&self.session_id, self.offset).await?;
            if !entries.is_empty() {
                self.offset += entries.len();
                self.pending.extend(entries);
                continue;
            }
            if closed {
                return None;
            }

            tokio::select! {
                changed = self.len_rx.changed() => {
                    if changed.is_err() {
                        // Log removed; the next read returns None
                        tokio::time::sleep(self.hub.poll).await;
                    }
                }
                _ = tokio::time::sleep(self.hub.poll) => {}
            }
        }
    }
}

/// Handle for the orchestrator to emit notices for one session
#[derive(Clone)]
pub struct ProgressEmitter {
    hub: ProgressHub,
    session_id: String,
}

impl ProgressEmitter {
    pub async fn emit(&self, notice: Notice) -> Option<usize> {
        self.hub.append(&self.session_id, notice).await
    }

    /// Status notice for the session's current state, plus the terminal
    /// notice when it has finished
    pub async fn session_state(&self, session: &ResearchSession) {
        for notice in notices_for(session) {
            self.emit(notice).await;
        }
    }

    pub async fn link(&self, query: &str) {
        self.emit(Notice::detail(DetailKind::Link, query)).await;
    }

    pub async fn curation(&self, title: &str) {
        self.emit(Notice::detail(DetailKind::Curation, title)).await;
    }

    pub async fn report_part(&self, label: &str) {
        self.emit(Notice::detail(DetailKind::Report, label)).await;
    }
}
