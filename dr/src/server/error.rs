//! HTTP error mapping

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error};

use crate::research::ResearchError;

/// A `ResearchError` rendered as a JSON error response
#[derive(Debug)]
pub struct ApiError(pub ResearchError);

impl From<ResearchError> for ApiError {
    fn from(e: ResearchError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ResearchError::NotFound(_) => StatusCode::NOT_FOUND,
            ResearchError::WrongState { .. } | ResearchError::AlreadyRunning(_) => StatusCode::CONFLICT,
            ResearchError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ResearchError::Llm(_) | ResearchError::Stage(_) => StatusCode::BAD_GATEWAY,
            ResearchError::Prompt(_) | ResearchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self.0, "request failed");
        } else {
            debug!(%status, error = %self.0, "request rejected");
        }
        let mut body = json!({"error": self.0.to_string()});
        if let ResearchError::Llm(e) = &self.0 {
            body["retryable"] = json!(e.is_retryable());
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::research::SessionStatus;

    #[test]
    fn test_status_mapping() {
        let status = |e: ResearchError| ApiError(e).status();
        assert_eq!(status(ResearchError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(ResearchError::wrong_state("x", SessionStatus::Evaluating, "busy")),
            StatusCode::CONFLICT
        );
        assert_eq!(status(ResearchError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(ResearchError::Llm(LlmError::InvalidResponse("x".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status(ResearchError::Prompt("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_generator_errors_carry_retryable_flag() {
        let response = ApiError(ResearchError::Llm(LlmError::Timeout(std::time::Duration::from_secs(1)))).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["retryable"], true);

        let response = ApiError(ResearchError::NotFound("x".into())).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("retryable").is_none());
    }
}
