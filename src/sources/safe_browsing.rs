use std::time::Duration;

use super::{http_client, json_body, ReputationSource, SourceReport, ThreatSource};
use crate::config::SafeBrowsingConfig;
use crate::error::SourceError;

/// Google Safe Browsing v4 `threatMatches:find` lookup for a single URL.
pub struct SafeBrowsingSource {
    endpoint: String,
    api_key: String,
    threat_types: Vec<String>,
    platform_types: Vec<String>,
    client: reqwest::Client,
}

impl SafeBrowsingSource {
    pub fn new(
        cfg: &SafeBrowsingConfig,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let endpoint = format!(
            "{}/v4/threatMatches:find",
            cfg.base_url.trim_end_matches('/')
        );
        Ok(Self {
            endpoint,
            api_key,
            threat_types: cfg.threat_types.clone(),
            platform_types: cfg.platform_types.clone(),
            client: http_client(timeout)?,
        })
    }

    fn request_body(&self, url: &str) -> serde_json::Value {
        serde_json::json!({
            "threatInfo": {
                "threatTypes": self.threat_types,
                "platformTypes": self.platform_types,
                "threatEntryTypes": ["URL"],
                "threatEntries": [{"url": url}]
            }
        })
    }
}

/// An empty object means "no match"; matches without a `threatType` are
/// ignored.
fn report_from_json(val: &serde_json::Value) -> SourceReport {
    let types = val
        .get("matches")
        .and_then(|m| m.as_array())
        .map(|matches| {
            matches
                .iter()
                .filter_map(|m| m.get("threatType").and_then(|t| t.as_str()))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    SourceReport {
        detections: None,
        threat_types: types,
    }
}

#[async_trait::async_trait]
impl ReputationSource for SafeBrowsingSource {
    fn kind(&self) -> ThreatSource {
        ThreatSource::SafeBrowsing
    }

    async fn lookup(&self, url: &str) -> Result<SourceReport, SourceError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(url))
            .send()
            .await?;
        let json = json_body(resp).await?;
        Ok(report_from_json(&json))
    }
}
