//! Server-sent event streams: session progress and streamed report prose

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::error::ApiError;
use super::state::AppState;
use crate::llm::StreamChunk;
use crate::progress::Notice;

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// First log offset to deliver
    pub from: Option<usize>,
}

/// Offset to resume from: the entry after `Last-Event-ID`, else `?from=`, else 0
pub fn resume_offset(headers: &HeaderMap, params: &StreamParams) -> usize {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|last| last.saturating_add(1))
        .or(params.from)
        .unwrap_or(0)
}

fn notice_event(offset: usize, notice: &Notice) -> Result<Event, axum::Error> {
    Event::default()
        .id(offset.to_string())
        .event(notice.event_name())
        .json_data(notice)
}

/// Progress notices for one session, replayed from the resume offset
pub async fn progress_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let from = resume_offset(&headers, &params);
    debug!(session_id = %id, from, "progress_stream: called");

    state.orchestrator.get_session(&id).await?;
    let events = state
        .orchestrator
        .hub()
        .subscribe(&id, from)
        .await
        .map(|(offset, notice)| notice_event(offset, &notice));
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// Raw generator text for a free-form report over the curated context
pub async fn report_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    debug!(session_id = %id, "report_stream: called");
    let chunks = state.orchestrator.start_report_stream(&id).await?;

    let events = stream::unfold(chunks, |mut chunks| async move {
        loop {
            let event = match chunks.next().await? {
                StreamChunk::TextDelta(text) => Event::default().json_data(json!({"text": text})),
                StreamChunk::Error(error) => Event::default().event("error").json_data(json!({"error": error})),
                StreamChunk::MessageDone { .. } => continue,
            };
            return Some((event, chunks));
        }
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_resume_offset() {
        let mut headers = HeaderMap::new();
        assert_eq!(resume_offset(&headers, &StreamParams::default()), 0);
        assert_eq!(resume_offset(&headers, &StreamParams { from: Some(4) }), 4);

        headers.insert("last-event-id", HeaderValue::from_static("7"));
        assert_eq!(resume_offset(&headers, &StreamParams { from: Some(4) }), 8);

        headers.insert("last-event-id", HeaderValue::from_static("junk"));
        assert_eq!(resume_offset(&headers, &StreamParams::default()), 0);

        headers.insert("last-event-id", HeaderValue::from_static("18446744073709551615"));
        assert_eq!(resume_offset(&headers, &StreamParams::default()), usize::MAX);
    }
}
