//! Error types.
//!
//! `AnalyzeError` is the only error a caller of `/api/analyze` ever sees.
//! `SourceError` describes a failed call to an external collaborator; it is
//! absorbed inside the checks and never crosses the orchestrator boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Terminal failures of a single analysis request.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    /// Carries detail for the log only; the response body stays generic.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalyzeError {
    pub fn status(&self) -> StatusCode {
        match self {
            AnalyzeError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AnalyzeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AnalyzeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `error` field of the response body.
    pub fn public_message(&self) -> String {
        match self {
            AnalyzeError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// JSON body of every non-success response: `{"error": "..."}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        if let AnalyzeError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "analysis failed");
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Failure of one call to a reputation source or the text generator.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source is not configured")]
    NotConfigured,

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Parse(String),
}

impl SourceError {
    /// Missing credentials are an expected deployment state, not an outage.
    pub fn is_not_configured(&self) -> bool {
        matches!(self, SourceError::NotConfigured)
    }
}
