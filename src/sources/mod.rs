//! Clients for the external services the checks depend on.
//!
//! The checks only see the `ReputationSource` and `TextGenerator` traits.
//! HTTP implementations live in the submodules; `DisabledSource` and
//! `DisabledGenerator` stand in when no credentials are configured.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::SourceError;

pub mod completions;
pub mod safe_browsing;
pub mod virustotal;

pub use completions::CompletionsGenerator;
pub use safe_browsing::SafeBrowsingSource;
pub use virustotal::VirusTotalSource;

/// Which threat-intelligence service produced a report or finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatSource {
    VirusTotal,
    SafeBrowsing,
}

impl fmt::Display for ThreatSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreatSource::VirusTotal => f.write_str("VirusTotal"),
            ThreatSource::SafeBrowsing => f.write_str("Safe Browsing"),
        }
    }
}

/// Normalized answer of a reputation lookup.  Services report either a
/// detection count, a list of matched threat types, or both; absent fields
/// stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub detections: Option<u64>,
    pub threat_types: Vec<String>,
}

impl SourceReport {
    pub fn detections(count: u64) -> Self {
        Self {
            detections: Some(count),
            threat_types: Vec::new(),
        }
    }

    pub fn threat_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            detections: None,
            threat_types: types.into_iter().map(Into::into).collect(),
        }
    }
}

/// A threat-intelligence service that can be asked about one URL.
#[async_trait::async_trait]
pub trait ReputationSource: Send + Sync {
    fn kind(&self) -> ThreatSource;
    async fn lookup(&self, url: &str) -> Result<SourceReport, SourceError>;
}

/// Sampling settings for one generative call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodingParams {
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default)]
    pub frequency_penalty: f64,
    #[serde(default)]
    pub presence_penalty: f64,
}

fn default_top_p() -> f64 {
    1.0
}

impl DecodingParams {
    /// Free-form risk assessment: room for a full answer, moderate sampling.
    pub fn analysis() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }

    /// One-word classification: tiny output, low temperature.
    pub fn sentiment() -> Self {
        Self {
            max_tokens: 10,
            temperature: 0.3,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// A generative-text service.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &DecodingParams)
        -> Result<String, SourceError>;
}

/// Placeholder for a reputation service without credentials.  Every lookup
/// fails immediately with `NotConfigured`; no I/O is performed.
pub struct DisabledSource {
    kind: ThreatSource,
}

impl DisabledSource {
    pub fn new(kind: ThreatSource) -> Self {
        Self { kind }
    }
}

#[async_trait::async_trait]
impl ReputationSource for DisabledSource {
    fn kind(&self) -> ThreatSource {
        self.kind
    }

    async fn lookup(&self, _url: &str) -> Result<SourceReport, SourceError> {
        Err(SourceError::NotConfigured)
    }
}

/// Placeholder for a text generator without credentials.
#[derive(Default)]
pub struct DisabledGenerator;

#[async_trait::async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _params: &DecodingParams,
    ) -> Result<String, SourceError> {
        Err(SourceError::NotConfigured)
    }
}

/// Bound any collaborator call by `limit`, independent of whatever timeout
/// the implementation applies itself.
pub async fn within<T, F>(limit: Duration, call: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(limit.as_millis() as u64)),
    }
}

/// Build the shared HTTP client used by the source implementations.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("phishscan/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(SourceError::from)
}

/// Turn an HTTP response into parsed JSON, mapping non-success statuses and
/// undecodable bodies to `SourceError`.
pub(crate) async fn json_body(resp: reqwest::Response) -> Result<serde_json::Value, SourceError> {
    let status = resp.status();
    // VirusTotal signals an exhausted quota with 204 and an empty body.
    if !status.is_success() || status == reqwest::StatusCode::NO_CONTENT {
        return Err(SourceError::Status(status.as_u16()));
    }
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| SourceError::Parse(e.to_string()))
}
