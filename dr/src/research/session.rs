//! ResearchSession - aggregate root for one research request

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use super::artifacts::{
    ClarificationQuestion, CuratedContext, EvaluationResult, FinalReport, QaPair, SearchPlan, SearchResults,
};

/// Requested research breadth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DepthHint {
    Basic,
    #[default]
    Medium,
    Deep,
}

impl DepthHint {
    /// Inclusive range of query counts asked of the plan generator
    pub fn query_range(&self) -> (usize, usize) {
        match self {
            DepthHint::Basic => (10, 11),
            DepthHint::Medium => (11, 13),
            DepthHint::Deep => (13, 15),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepthHint::Basic => "basic",
            DepthHint::Medium => "medium",
            DepthHint::Deep => "deep",
        }
    }
}

impl fmt::Display for DepthHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Externally visible session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    ClarificationNeeded,
    AwaitingClarification,
    GeneratingPlan,
    SearchingWeb,
    CuratingContext,
    Evaluating,
    GeneratingReport,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::ClarificationNeeded => "clarification_needed",
            SessionStatus::AwaitingClarification => "awaiting_clarification",
            SessionStatus::GeneratingPlan => "generating_plan",
            SessionStatus::SearchingWeb => "searching_web",
            SessionStatus::CuratingContext => "curating_context",
            SessionStatus::Evaluating => "evaluating",
            SessionStatus::GeneratingReport => "generating_report",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }

    /// Coarse stage name shown to users
    pub fn step(&self) -> &'static str {
        match self {
            SessionStatus::ClarificationNeeded | SessionStatus::AwaitingClarification => "clarification",
            SessionStatus::GeneratingPlan => "plan_generation",
            SessionStatus::SearchingWeb => "web_search",
            SessionStatus::CuratingContext => "context_curation",
            SessionStatus::Evaluating => "evaluation",
            SessionStatus::GeneratingReport => "report_generation",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the session is in the research state machine
///
/// The final report and the error message only exist inside their terminal
/// variants, so a session can never carry both or carry one while running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    ClarificationNeeded,
    AwaitingClarification,
    GeneratingPlan {
        /// Plan built by the evaluator from its additional queries
        #[serde(default, skip_serializing_if = "Option::is_none")]
        followup: Option<SearchPlan>,
    },
    SearchingWeb,
    CuratingContext,
    Evaluating,
    GeneratingReport,
    Completed {
        report: Box<FinalReport>,
    },
    #[serde(rename = "error")]
    Failed {
        /// Status the session was in when the stage failed
        stage: SessionStatus,
        error: String,
    },
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::ClarificationNeeded => SessionStatus::ClarificationNeeded,
            SessionState::AwaitingClarification => SessionStatus::AwaitingClarification,
            SessionState::GeneratingPlan { .. } => SessionStatus::GeneratingPlan,
            SessionState::SearchingWeb => SessionStatus::SearchingWeb,
            SessionState::CuratingContext => SessionStatus::CuratingContext,
            SessionState::Evaluating => SessionStatus::Evaluating,
            SessionState::GeneratingReport => SessionStatus::GeneratingReport,
            SessionState::Completed { .. } => SessionStatus::Completed,
            SessionState::Failed { .. } => SessionStatus::Error,
        }
    }
}

/// One research request and every artifact produced for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: String,
    pub topic: String,
    pub depth_hint: DepthHint,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every successful update
    pub revision: u64,
    /// Completed search/curate/evaluate cycles
    pub iterations: u32,
    pub clarification_questions: Option<Vec<ClarificationQuestion>>,
    pub clarification_answers: Option<BTreeMap<String, String>>,
    pub search_plan: Option<SearchPlan>,
    pub search_results: Option<SearchResults>,
    pub curated_context: Option<CuratedContext>,
    pub evaluation_result: Option<EvaluationResult>,
    pub state: SessionState,
}

impl ResearchSession {
    pub fn new(topic: impl Into<String>, depth_hint: DepthHint) -> Self {
        let topic = topic.into();
        debug!(%topic, %depth_hint, "ResearchSession::new: called");
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            topic,
            depth_hint,
            created_at: now,
            updated_at: now,
            revision: 0,
            iterations: 0,
            clarification_questions: None,
            clarification_answers: None,
            search_plan: None,
            search_results: None,
            curated_context: None,
            evaluation_result: None,
            state: SessionState::ClarificationNeeded,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn step(&self) -> &'static str {
        self.status().step()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn final_report(&self) -> Option<&FinalReport> {
        match &self.state {
            SessionState::Completed { report } => Some(report),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            SessionState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Record a fatal stage error; terminal sessions are left untouched
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.state = SessionState::Failed {
            stage: self.status(),
            error: error.into(),
        };
    }

    /// Question/answer pairs in question order
    ///
    /// Answers keyed by an id that matches no question are kept, with the id
    /// standing in for the question text.
    pub fn qa_pairs(&self) -> Vec<QaPair> {
        let Some(answers) = &self.clarification_answers else {
            return Vec::new();
        };
        let questions = self.clarification_questions.as_deref().unwrap_or_default();

        let mut pairs: Vec<QaPair> = questions
            .iter()
            .filter_map(|q| {
                answers.get(&q.id).map(|a| QaPair {
                    question: q.question.clone(),
                    answer: a.clone(),
                })
            })
            .collect();

        pairs.extend(
            answers
                .iter()
                .filter(|(id, _)| !questions.iter().any(|q| &q.id == *id))
                .map(|(id, a)| QaPair {
                    question: id.clone(),
                    answer: a.clone(),
                }),
        );
        pairs
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            topic: self.topic.clone(),
            status: self.status(),
            step: self.step().to_string(),
            iterations: self.iterations,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub topic: String,
    pub status: SessionStatus,
    pub step: String,
    pub iterations: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::artifacts::{Outline, ReportMetadata};

    fn report() -> FinalReport {
        FinalReport {
            title: "T".to_string(),
            introduction: String::new(),
            sections: vec![],
            conclusion: String::new(),
            references: vec![],
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                topic: "t".to_string(),
                sources_count: 0,
                iterations: 1,
                confidence_score: None,
            },
        }
    }

    #[test]
    fn test_new_session() {
        let session = ResearchSession::new("renewable energy storage", DepthHint::default());
        assert_eq!(session.status(), SessionStatus::ClarificationNeeded);
        assert_eq!(session.step(), "clarification");
        assert_eq!(session.depth_hint, DepthHint::Medium);
        assert_eq!(session.iterations, 0);
        assert!(session.final_report().is_none());
        assert!(session.error().is_none());
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::GeneratingReport).unwrap(),
            "\"generating_report\""
        );
        assert_eq!(SessionStatus::SearchingWeb.to_string(), "searching_web");
        assert_eq!(SessionStatus::CuratingContext.step(), "context_curation");
    }

    #[test]
    fn test_terminal_variants_carry_payload() {
        let mut session = ResearchSession::new("t", DepthHint::Basic);
        session.state = SessionState::Completed {
            report: Box::new(report()),
        };
        assert!(session.is_terminal());
        assert_eq!(session.final_report().map(|r| r.title.as_str()), Some("T"));
        assert!(session.error().is_none());

        // Completed sessions cannot be failed afterwards
        session.fail("late error");
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[test]
    fn test_fail_records_stage() {
        let mut session = ResearchSession::new("t", DepthHint::Basic);
        session.state = SessionState::SearchingWeb;
        session.fail("all queries failed");

        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.error(), Some("all queries failed"));
        match &session.state {
            SessionState::Failed { stage, .. } => assert_eq!(*stage, SessionStatus::SearchingWeb),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let state = SessionState::Failed {
            stage: SessionStatus::Evaluating,
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "error");
        let back: SessionState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);

        let plan = SessionState::GeneratingPlan { followup: None };
        assert_eq!(serde_json::to_value(&plan).unwrap()["status"], "generating_plan");
    }

    #[test]
    fn test_qa_pairs_follow_question_order() {
        let mut session = ResearchSession::new("t", DepthHint::Medium);
        session.clarification_questions = Some(vec![
            ClarificationQuestion {
                id: "q1".to_string(),
                question: "Which region?".to_string(),
            },
            ClarificationQuestion {
                id: "q2".to_string(),
                question: "Which timeframe?".to_string(),
            },
        ]);
        session.clarification_answers = Some(BTreeMap::from([
            ("q2".to_string(), "2030".to_string()),
            ("q1".to_string(), "Europe".to_string()),
            ("extra".to_string(), "also storage costs".to_string()),
        ]));

        let pairs = session.qa_pairs();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].question, "Which region?");
        assert_eq!(pairs[0].answer, "Europe");
        assert_eq!(pairs[1].answer, "2030");
        assert_eq!(pairs[2].question, "extra");
    }

    #[test]
    fn test_summary() {
        let mut session = ResearchSession::new("t", DepthHint::Deep);
        session.curated_context = Some(CuratedContext {
            content: "c".to_string(),
            sources: vec![],
            structure: Outline::fallback(),
        });
        session.state = SessionState::Evaluating;
        let summary = session.summary();
        assert_eq!(summary.status, SessionStatus::Evaluating);
        assert_eq!(summary.step, "evaluation");
    }
}
