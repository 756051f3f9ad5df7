//! Progress notices delivered to subscribers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::research::{FinalReport, SessionStatus};

/// Labels emitted while the report is being written, in order
pub const REPORT_PROGRESS: [&str; 5] = [
    "Drafting report title",
    "Writing introduction",
    "Composing sections",
    "Writing conclusion",
    "Compiling references",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    /// A search query being run
    Link,
    /// A source being curated
    Curation,
    /// A report part being written
    Report,
}

impl fmt::Display for DetailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetailKind::Link => "link",
            DetailKind::Curation => "curation",
            DetailKind::Report => "report",
        };
        write!(f, "{s}")
    }
}

/// One discrete progress notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    Status {
        status: SessionStatus,
        step: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Detail {
        detail_type: DetailKind,
        detail: String,
    },
    Completed {
        report: Box<FinalReport>,
    },
    Error {
        error: String,
    },
}

impl Notice {
    pub fn status(status: SessionStatus, error: Option<String>) -> Self {
        Notice::Status {
            status,
            step: status.step().to_string(),
            error,
        }
    }

    pub fn detail(detail_type: DetailKind, detail: impl Into<String>) -> Self {
        Notice::Detail {
            detail_type,
            detail: detail.into(),
        }
    }

    /// Composite key; a log never holds two notices with the same key
    pub fn dedup_key(&self) -> String {
        match self {
            Notice::Status { status, .. } => format!("status:{status}"),
            Notice::Detail { detail_type, detail } => format!("detail:{detail_type}:{detail}"),
            Notice::Completed { .. } => "completed".to_string(),
            Notice::Error { .. } => "error".to_string(),
        }
    }

    /// Completed and Error end a session's notice sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Notice::Completed { .. } | Notice::Error { .. })
    }

    /// SSE event name
    pub fn event_name(&self) -> &'static str {
        match self {
            Notice::Status { .. } => "status",
            Notice::Detail { .. } => "detail",
            Notice::Completed { .. } => "completed",
            Notice::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keys() {
        let a = Notice::detail(DetailKind::Link, "solar storage");
        let b = Notice::detail(DetailKind::Curation, "solar storage");
        assert_ne!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key(), Notice::detail(DetailKind::Link, "solar storage").dedup_key());

        let s1 = Notice::status(SessionStatus::Evaluating, None);
        let s2 = Notice::status(SessionStatus::Evaluating, Some("x".to_string()));
        assert_eq!(s1.dedup_key(), s2.dedup_key());
    }

    #[test]
    fn test_status_notice_json() {
        let json = serde_json::to_value(Notice::status(SessionStatus::SearchingWeb, None)).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["status"], "searching_web");
        assert_eq!(json["step"], "web_search");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_detail_notice_json() {
        let json = serde_json::to_value(Notice::detail(DetailKind::Report, REPORT_PROGRESS[0])).unwrap();
        assert_eq!(json["type"], "detail");
        assert_eq!(json["detail_type"], "report");
        assert_eq!(json["detail"], "Drafting report title");
    }

    #[test]
    fn test_terminal() {
        assert!(
            Notice::Error {
                error: "x".to_string()
            }
            .is_terminal()
        );
        assert!(!Notice::status(SessionStatus::Completed, None).is_terminal());
    }
}
