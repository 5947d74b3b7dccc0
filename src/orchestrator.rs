//! Request lifecycle: admit, validate, extract, scan, assemble.
//!
//! The orchestrator owns every check and the limiter registry.  Scan
//! failures never reach it as errors; it only sees `Checked` values and
//! turns them into a `Verdict`.  The only errors it produces are the
//! terminal `AnalyzeError` shapes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::checks::{Checked, FileReputationChecker, NarrativeAnalyzer, UrlReputationChecker};
use crate::config::AppConfig;
use crate::error::{AnalyzeError, SourceError};
use crate::extract::{extract_file_refs, extract_urls};
use crate::metrics::Metrics;
use crate::ratelimit::RateLimiters;
use crate::sources::{
    CompletionsGenerator, DisabledGenerator, DisabledSource, ReputationSource, SafeBrowsingSource,
    TextGenerator, ThreatSource, VirusTotalSource,
};
use crate::{AnalysisRequest, Verdict};

/// Limiter used by the `/api/analyze` endpoint.
pub const ANALYZE_LIMITER: &str = "analyze";

const DEFAULT_REQUEST_BUDGET: Duration = Duration::from_secs(45);

pub struct Orchestrator {
    limiters: Arc<RateLimiters>,
    url_checker: UrlReputationChecker,
    file_checker: FileReputationChecker,
    narrative: NarrativeAnalyzer,
    request_budget: Duration,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(
        limiters: Arc<RateLimiters>,
        url_checker: UrlReputationChecker,
        file_checker: FileReputationChecker,
        narrative: NarrativeAnalyzer,
    ) -> Self {
        Self {
            limiters,
            url_checker,
            file_checker,
            narrative,
            request_budget: DEFAULT_REQUEST_BUDGET,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Overall deadline for the scan stage of one request.
    pub fn with_request_budget(mut self, budget: Duration) -> Self {
        self.request_budget = budget;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Wire the HTTP-backed sources described by `config`.  A service without
    /// an API key is replaced by a disabled stand-in so its check degrades
    /// instead of calling out with bad credentials.
    pub fn from_config(config: &AppConfig, limiters: Arc<RateLimiters>) -> Result<Self, SourceError> {
        let svc = &config.service;
        let timeout = Duration::from_millis(config.call_timeout_ms);

        let primary: Arc<dyn ReputationSource> = match svc.virustotal.api_key.clone() {
            Some(key) => Arc::new(VirusTotalSource::new(&svc.virustotal, key, timeout)?),
            None => {
                tracing::warn!("VirusTotal API key not configured; URL and file lookups will degrade");
                Arc::new(DisabledSource::new(ThreatSource::VirusTotal))
            }
        };
        let secondary: Arc<dyn ReputationSource> = match svc.safe_browsing.api_key.clone() {
            Some(key) => Arc::new(SafeBrowsingSource::new(&svc.safe_browsing, key, timeout)?),
            None => {
                tracing::warn!("Safe Browsing API key not configured; secondary URL lookups will degrade");
                Arc::new(DisabledSource::new(ThreatSource::SafeBrowsing))
            }
        };
        let generator: Arc<dyn TextGenerator> = match svc.text_generation.api_key.clone() {
            Some(key) => Arc::new(CompletionsGenerator::new(&svc.text_generation, key, timeout)?),
            None => {
                tracing::warn!("text generation API key not configured; narrative analysis will degrade");
                Arc::new(DisabledGenerator)
            }
        };

        let url_checker = UrlReputationChecker::new(primary.clone(), secondary, timeout)
            .with_concurrency(config.url_concurrency);
        let file_checker = FileReputationChecker::new(primary, timeout);
        let narrative = NarrativeAnalyzer::new(generator, timeout).with_params(
            svc.text_generation.analysis,
            svc.text_generation.sentiment,
        );

        Ok(Self::new(limiters, url_checker, file_checker, narrative)
            .with_request_budget(Duration::from_millis(config.request_budget_ms)))
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn limiters(&self) -> &Arc<RateLimiters> {
        &self.limiters
    }

    pub fn request_budget(&self) -> Duration {
        self.request_budget
    }

    /// Run one analysis.  `submission` is the already-decoded body, or the
    /// error decoding it produced; admission is decided before either is
    /// looked at.
    pub async fn analyze(
        &self,
        limiter_id: &str,
        submission: Result<AnalysisRequest, AnalyzeError>,
    ) -> Result<Verdict, AnalyzeError> {
        self.metrics.record_request();
        if !self.limiters.admit(limiter_id) {
            self.metrics.record_rate_limited();
            tracing::info!(limiter = %limiter_id, "rate limit exceeded");
            return Err(AnalyzeError::RateLimitExceeded);
        }
        let admitted_at = Instant::now();
        tracing::debug!(stage = "admitted", limiter = %limiter_id);

        let result = self.process(submission, admitted_at).await;
        match &result {
            Ok(verdict) => {
                self.metrics
                    .record_verdict(admitted_at.elapsed().as_millis() as u64);
                tracing::info!(
                    url_threats = verdict.url_threats.len(),
                    file_threats = verdict.file_threats,
                    sentiment = %verdict.sentiment,
                    processing_time = verdict.processing_time,
                    "verdict assembled"
                );
            }
            Err(AnalyzeError::Internal(_)) => self.metrics.record_internal_error(),
            Err(err) => {
                self.metrics.record_invalid();
                tracing::info!(error = %err, "request rejected");
            }
        }
        result
    }

    async fn process(
        &self,
        submission: Result<AnalysisRequest, AnalyzeError>,
        admitted_at: Instant,
    ) -> Result<Verdict, AnalyzeError> {
        let email = submission?.into_email().map_err(|missing| {
            AnalyzeError::InvalidInput(format!(
                "Missing required fields: {}",
                missing.join(", ")
            ))
        })?;
        tracing::debug!(stage = "validated");

        let urls = extract_urls(&email.anchor);
        let files = extract_file_refs(&email.attachments);
        tracing::debug!(stage = "extracted", urls = urls.len(), files = files.len());

        let scans = async {
            tokio::join!(
                self.url_checker.check_urls(&urls),
                self.file_checker.check_files(&files),
                self.narrative.run(&email.sender, &email.title, &email.body),
            )
        };
        // On expiry the join future is dropped, abandoning every outstanding
        // call; partial results are discarded with it.
        let (threats, file_score, narrative) = tokio::time::timeout(self.request_budget, scans)
            .await
            .map_err(|_| {
                AnalyzeError::Internal(format!(
                    "request budget of {} ms exhausted",
                    self.request_budget.as_millis()
                ))
            })?;
        tracing::debug!(stage = "scanned");

        self.note_degraded("url_reputation", &threats);
        self.note_degraded("file_reputation", &file_score);
        self.note_degraded("narrative", &narrative);

        let narrative = narrative.into_inner();
        Ok(Verdict {
            analysis: narrative.analysis,
            sentiment: narrative.sentiment,
            url_threats: threats
                .into_inner()
                .into_iter()
                .map(|f| f.description)
                .collect(),
            file_threats: file_score.into_inner(),
            processing_time: round_seconds(admitted_at.elapsed()),
        })
    }

    fn note_degraded<T>(&self, check: &'static str, result: &Checked<T>) {
        if result.is_degraded() {
            self.metrics.record_degraded(check);
            tracing::warn!(check, "check degraded to default values");
        }
    }
}

/// Seconds rounded to two decimals.
fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
