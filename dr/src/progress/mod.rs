//! Progress broadcasting for research sessions
//!
//! Notices are appended to a per-session log and never re-sent: each carries
//! a composite key and the log refuses duplicates. Subscribers tail the log
//! from any offset, which makes reconnection a replay from the last offset seen.

mod hub;
mod notice;

pub use hub::{LoggedNotice, ProgressEmitter, ProgressHub};
pub use notice::{DetailKind, Notice, REPORT_PROGRESS};
