//! JSON request handlers

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::error::ApiError;
use super::state::AppState;
use crate::research::{
    ClarificationQuestion, DepthHint, FinalReport, ResearchError, SessionStatus, SessionSummary,
};

#[derive(Debug, Deserialize)]
pub struct CreateResearch {
    pub topic: String,
    #[serde(default)]
    pub depth: Option<DepthHint>,
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub session_id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct Questions {
    pub session_id: String,
    pub questions: Vec<ClarificationQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct Answers {
    pub answers: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub status: SessionStatus,
    pub step: String,
    pub iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

pub async fn create_research(
    State(state): State<AppState>,
    Json(body): Json<CreateResearch>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    debug!(topic = %body.topic, ?body.depth, "create_research: called");
    let session = state
        .orchestrator
        .create_session(&body.topic, body.depth.unwrap_or_default())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Created {
            session_id: session.id,
            status: session.state.status(),
        }),
    ))
}

pub async fn list_research(State(state): State<AppState>) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let sessions = state.orchestrator.list_sessions().await?;
    Ok(Json(sessions.iter().map(|s| s.summary()).collect()))
}

pub async fn get_clarification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Questions>, ApiError> {
    debug!(session_id = %id, "get_clarification: called");
    let questions = state.orchestrator.request_clarification(&id).await?;
    Ok(Json(Questions {
        session_id: id,
        questions,
    }))
}

/// Store answers and hand the stage chain to a background driver
pub async fn submit_clarification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Answers>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    debug!(session_id = %id, count = body.answers.len(), "submit_clarification: called");
    let session = state.orchestrator.submit_answers(&id, body.answers).await?;
    state.runner.start(&id)?;
    info!(session_id = %id, "submit_clarification: research started");
    Ok((StatusCode::ACCEPTED, Json(json!({"status": session.status()}))))
}

pub async fn get_status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<StatusView>, ApiError> {
    let session = state.orchestrator.get_session(&id).await?;
    Ok(Json(StatusView {
        status: session.status(),
        step: session.step().to_string(),
        iterations: session.iterations,
        error: session.error().map(str::to_string),
    }))
}

pub async fn get_report(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<FinalReport>, ApiError> {
    let session = state.orchestrator.get_session(&id).await?;
    match session.final_report() {
        Some(report) => Ok(Json(report.clone())),
        None => Err(ResearchError::wrong_state(&id, session.status(), "report not available").into()),
    }
}
