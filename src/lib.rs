//! Core library for phishscan.  This module defines the request/response
//! structures, wires the orchestrator into shared state and exposes the
//! HTTP handlers.

mod config;
pub mod checks;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod orchestrator;
pub mod ratelimit;
pub mod sources;

pub use config::{AppConfig, SafeBrowsingConfig, ServiceConfig, TextGenerationConfig, VirusTotalConfig};
pub use error::{AnalyzeError, ErrorBody, SourceError};
pub use extract::{Anchor, Attachment};
pub use orchestrator::{Orchestrator, ANALYZE_LIMITER};

use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody, JsonRejection},
    DefaultBodyLimit, State,
};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::checks::Sentiment;
use crate::metrics::Metrics;
use crate::ratelimit::RateLimiters;

/// An email submitted for analysis.  Every field is optional at the decoding
/// stage so that absence can be reported as a validation failure rather
/// than a decoding error.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct AnalysisRequest {
    pub sender: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub anchor: Option<Vec<Anchor>>,
    pub attachments: Option<Vec<Attachment>>,
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct Email {
    pub sender: String,
    pub title: String,
    pub body: String,
    pub anchor: Vec<Anchor>,
    pub attachments: Vec<Attachment>,
}

impl AnalysisRequest {
    /// Names of required fields that are absent (empty if valid).  Empty
    /// strings and empty lists count as present.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push("title");
        }
        if self.sender.is_none() {
            missing.push("sender");
        }
        if self.body.is_none() {
            missing.push("body");
        }
        if self.anchor.is_none() {
            missing.push("anchor");
        }
        if self.attachments.is_none() {
            missing.push("attachments");
        }
        missing
    }

    pub fn into_email(self) -> Result<Email, Vec<&'static str>> {
        match self {
            AnalysisRequest {
                sender: Some(sender),
                title: Some(title),
                body: Some(body),
                anchor: Some(anchor),
                attachments: Some(attachments),
            } => Ok(Email {
                sender,
                title,
                body,
                anchor,
                attachments,
            }),
            incomplete => Err(incomplete.missing_required_fields()),
        }
    }
}

/// The aggregated result returned for one email.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub analysis: String,
    pub sentiment: Sentiment,
    /// One description per finding, URL-major in submission order.
    pub url_threats: Vec<String>,
    /// Highest detection count over all attachments (0 = clean or unknown).
    pub file_threats: u64,
    /// Seconds from admission to assembly, two decimals.
    pub processing_time: f64,
}

/// Internal application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<Metrics>,
    /// Maximum accepted raw request body size in bytes (None => axum default)
    pub max_request_bytes: Option<usize>,
    /// Origins allowed to call `/api/*` from a browser (empty => CORS off)
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, config: &AppConfig) -> Self {
        let metrics = orchestrator.metrics().clone();
        Self {
            orchestrator: Arc::new(orchestrator),
            metrics,
            max_request_bytes: config.max_request_bytes,
            allowed_origins: config.allowed_origins.clone(),
        }
    }
}

/// Build state from environment variables.  See `AppConfig::from_env` for
/// the variables read; the most important are:
///
/// * `PHISHSCAN_SERVICE_CONFIG` (optional) – path to a JSON service configuration file.
/// * `VIRUSTOTAL_API_KEY`, `GOOGLE_SAFEBROWSING_API_KEY`, `OPENAI_API_KEY` – credentials.
/// * `PHISHSCAN_RATE_LIMIT_PER_MINUTE` (optional) – admission ceiling, default 30.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    Ok(build_state(&config)?)
}

/// Build state from an explicit configuration.
pub fn build_state(config: &AppConfig) -> Result<AppState, SourceError> {
    let limiters = Arc::new(RateLimiters::new(config.rate_limit_per_minute));
    let orchestrator = Orchestrator::from_config(config, limiters)?;
    tracing::info!(
        rate_limit_per_minute = config.rate_limit_per_minute,
        call_timeout_ms = config.call_timeout_ms,
        request_budget_ms = config.request_budget_ms,
        "analysis pipeline ready"
    );
    Ok(AppState::new(orchestrator, config))
}

/// Build the Axum router and attach handlers.  The router holds a copy
/// of the `AppState` for each invocation.
pub fn app(state: AppState) -> Router {
    let api = Router::new().route("/api/analyze", post(analyze_handler));
    let api = match cors_layer(&state.allowed_origins) {
        Some(cors) => api.layer(cors),
        None => api,
    };

    let router = Router::new()
        .merge(api)
        .route("/healthz", axum::routing::get(healthz_handler))
        .route("/metrics", axum::routing::get(metrics_handler));

    let router = if let Some(limit) = state.max_request_bytes {
        router.layer(DefaultBodyLimit::max(limit))
    } else {
        router
    };

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if parsed.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods([Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]),
    )
}

fn handle_panic(_err: Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response {
    AnalyzeError::Internal("handler panicked".into()).into_response()
}

/// Map a body decoding failure onto the caller-facing error.
fn submission_from(
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<AnalysisRequest, AnalyzeError> {
    match payload {
        Ok(Json(inner)) => Ok(inner),
        Err(JsonRejection::BytesRejection(BytesRejection::FailedToBufferBody(
            FailedToBufferBody::LengthLimitError(_),
        ))) => {
            tracing::warn!("request body exceeded configured limit");
            Err(AnalyzeError::PayloadTooLarge)
        }
        Err(JsonRejection::MissingJsonContentType(_)) => {
            Err(AnalyzeError::InvalidInput("No data provided".into()))
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "undecodable analyze payload");
            Err(AnalyzeError::InvalidInput("Invalid request body".into()))
        }
    }
}

/// Handler for `POST /api/analyze`.  Admission is checked before the body
/// is inspected; the orchestrator does the rest.
async fn analyze_handler(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> axum::response::Response {
    let submission = submission_from(payload);
    match state
        .orchestrator
        .analyze(ANALYZE_LIMITER, submission)
        .await
    {
        Ok(verdict) => (StatusCode::OK, Json(verdict)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Simple health endpoint for container readiness / liveness checks.
async fn healthz_handler(State(state): State<AppState>) -> axum::response::Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rateLimitPerMinute": state.orchestrator.limiters().max_per_window(),
        "requestBudgetMs": state.orchestrator.request_budget().as_millis() as u64,
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reports_missing_fields_in_order() {
        let req: AnalysisRequest =
            serde_json::from_value(json!({"sender": "a@b.c", "anchor": []})).unwrap();
        assert_eq!(
            req.missing_required_fields(),
            vec!["title", "body", "attachments"]
        );
        assert_eq!(
            req.into_email().unwrap_err(),
            vec!["title", "body", "attachments"]
        );
    }

    #[test]
    fn explicit_null_counts_as_missing() {
        let req: AnalysisRequest = serde_json::from_value(json!({
            "sender": "a@b.c", "title": "t", "body": "b", "anchor": [], "attachments": null
        }))
        .unwrap();
        assert_eq!(req.missing_required_fields(), vec!["attachments"]);
    }

    #[test]
    fn complete_request_converts() {
        let req: AnalysisRequest = serde_json::from_value(json!({
            "sender": "", "title": "t", "body": "b",
            "anchor": [{"url": "https://x.example"}, {"text": "none"}],
            "attachments": []
        }))
        .unwrap();
        let email = req.into_email().unwrap();
        assert_eq!(email.sender, "");
        assert_eq!(email.anchor.len(), 2);
    }

    #[test]
    fn verdict_uses_wire_names() {
        let verdict = Verdict {
            analysis: "Low".into(),
            sentiment: Sentiment::Neutral,
            url_threats: vec![],
            file_threats: 0,
            processing_time: 0.42,
        };
        let v = serde_json::to_value(&verdict).unwrap();
        assert_eq!(
            v,
            json!({
                "analysis": "Low",
                "sentiment": "Neutral",
                "urlThreats": [],
                "fileThreats": 0,
                "processingTime": 0.42
            })
        );
    }

    #[test]
    fn invalid_cors_origins_are_dropped() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_none());
        assert!(cors_layer(&["https://mail.example.com".to_string()]).is_some());
    }
}
