use std::time::Duration;

use super::{http_client, json_body, ReputationSource, SourceReport, ThreatSource};
use crate::config::VirusTotalConfig;
use crate::error::SourceError;

/// VirusTotal public API (v2) URL report lookup.  The `positives` field of
/// the report is the number of engines that flagged the resource.
pub struct VirusTotalSource {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl VirusTotalSource {
    pub fn new(
        cfg: &VirusTotalConfig,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let endpoint = format!("{}/vtapi/v2/url/report", cfg.base_url.trim_end_matches('/'));
        Ok(Self {
            endpoint,
            api_key,
            client: http_client(timeout)?,
        })
    }
}

fn report_from_json(val: &serde_json::Value) -> SourceReport {
    SourceReport {
        detections: val.get("positives").and_then(|v| v.as_u64()),
        threat_types: Vec::new(),
    }
}

#[async_trait::async_trait]
impl ReputationSource for VirusTotalSource {
    fn kind(&self) -> ThreatSource {
        ThreatSource::VirusTotal
    }

    async fn lookup(&self, url: &str) -> Result<SourceReport, SourceError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("apikey", self.api_key.as_str()), ("resource", url)])
            .send()
            .await?;
        let json = json_body(resp).await?;
        Ok(report_from_json(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_positives() {
        let report = report_from_json(&json!({"response_code": 1, "positives": 7, "total": 70}));
        assert_eq!(report.detections, Some(7));
    }

    #[test]
    fn missing_positives_is_unknown() {
        // response_code 0: resource not in the dataset
        let report = report_from_json(&json!({"response_code": 0, "verbose_msg": "not found"}));
        assert_eq!(report.detections, None);
        assert!(report.threat_types.is_empty());
    }
}
