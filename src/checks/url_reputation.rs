use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use super::{log_absorbed, Checked};
use crate::sources::{within, ReputationSource, ThreatSource};

/// One threat reported for one URL by one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreatFinding {
    pub source: ThreatSource,
    pub url: String,
    pub description: String,
}

struct UrlOutcome {
    findings: Vec<ThreatFinding>,
    degraded: bool,
}

/// Checks URLs against a primary source (detection counts) and falls back
/// to a secondary source (threat-type matches) when the primary has nothing
/// to say.
pub struct UrlReputationChecker {
    primary: Arc<dyn ReputationSource>,
    secondary: Arc<dyn ReputationSource>,
    call_timeout: Duration,
    concurrency: usize,
}

impl UrlReputationChecker {
    pub fn new(
        primary: Arc<dyn ReputationSource>,
        secondary: Arc<dyn ReputationSource>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            call_timeout,
            concurrency: 1,
        }
    }

    /// Number of URLs looked up at the same time.  Output order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Findings for all `urls`, URL-major in input order.  Source failures
    /// never abort the batch; they only mark the result degraded.
    pub async fn check_urls(&self, urls: &[String]) -> Checked<Vec<ThreatFinding>> {
        let lookups: Vec<_> = urls.iter().map(|url| self.check_url(url)).collect();
        let outcomes: Vec<UrlOutcome> = stream::iter(lookups)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut degraded = false;
        let mut findings = Vec::new();
        for outcome in outcomes {
            degraded |= outcome.degraded;
            findings.extend(outcome.findings);
        }
        Checked::new(findings, degraded)
    }

    async fn check_url(&self, url: &str) -> UrlOutcome {
        let mut degraded = false;

        match within(self.call_timeout, self.primary.lookup(url)).await {
            Ok(report) => {
                if let Some(count) = report.detections.filter(|n| *n > 0) {
                    tracing::info!(url = %url, source = %self.primary.kind(), count, "url flagged");
                    let finding = ThreatFinding {
                        source: self.primary.kind(),
                        url: url.to_string(),
                        description: format!(
                            "{} detected {} threats in {}",
                            self.primary.kind(),
                            count,
                            url
                        ),
                    };
                    // A positive primary verdict is final for this URL.
                    return UrlOutcome {
                        findings: vec![finding],
                        degraded,
                    };
                }
            }
            Err(err) => {
                log_absorbed("url_reputation", url, &err);
                degraded = true;
            }
        }

        let mut findings = Vec::new();
        match within(self.call_timeout, self.secondary.lookup(url)).await {
            Ok(report) => {
                for threat_type in report.threat_types {
                    tracing::info!(url = %url, source = %self.secondary.kind(), threat_type = %threat_type, "url flagged");
                    findings.push(ThreatFinding {
                        source: self.secondary.kind(),
                        url: url.to_string(),
                        description: format!("{} threat found in {}", threat_type, url),
                    });
                }
            }
            Err(err) => {
                log_absorbed("url_reputation", url, &err);
                degraded = true;
            }
        }
        UrlOutcome { findings, degraded }
    }
}
