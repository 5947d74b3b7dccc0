use criterion::{black_box, criterion_group, criterion_main, Criterion};
use phishscan::checks::{FileReputationChecker, NarrativeAnalyzer, UrlReputationChecker};
use phishscan::ratelimit::RateLimiters;
use phishscan::sources::{
    DecodingParams, ReputationSource, SourceReport, TextGenerator, ThreatSource,
};
use phishscan::{AnalysisRequest, Anchor, Attachment, Orchestrator, SourceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

// Flags every URL containing "bad"; answers without I/O.
struct StaticReputation(ThreatSource);

#[async_trait::async_trait]
impl ReputationSource for StaticReputation {
    fn kind(&self) -> ThreatSource {
        self.0
    }

    async fn lookup(&self, url: &str) -> Result<SourceReport, SourceError> {
        Ok(match self.0 {
            ThreatSource::VirusTotal => SourceReport::detections(url.contains("bad") as u64 * 3),
            ThreatSource::SafeBrowsing => SourceReport::threat_types(
                url.contains("phish").then_some("SOCIAL_ENGINEERING"),
            ),
        })
    }
}

struct CannedGenerator;

#[async_trait::async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str, _params: &DecodingParams) -> Result<String, SourceError> {
        if prompt.starts_with("Classify") {
            Ok("Negative".into())
        } else {
            Ok("Phishing likelihood: High".into())
        }
    }
}

fn orchestrator() -> Orchestrator {
    let primary: Arc<dyn ReputationSource> = Arc::new(StaticReputation(ThreatSource::VirusTotal));
    let secondary: Arc<dyn ReputationSource> =
        Arc::new(StaticReputation(ThreatSource::SafeBrowsing));
    let timeout = Duration::from_secs(1);
    Orchestrator::new(
        Arc::new(RateLimiters::new(usize::MAX)),
        UrlReputationChecker::new(primary.clone(), secondary, timeout).with_concurrency(4),
        FileReputationChecker::new(primary, timeout),
        NarrativeAnalyzer::new(Arc::new(CannedGenerator), timeout),
    )
}

fn email(links: usize) -> AnalysisRequest {
    let anchor = (0..links)
        .map(|i| match i % 3 {
            0 => Anchor::new(format!("http://bad{i}.example")),
            1 => Anchor::new(format!("http://phish{i}.example")),
            _ => Anchor::new(format!("http://clean{i}.example")),
        })
        .collect();
    AnalysisRequest {
        sender: Some("billing@paypa1.example".into()),
        title: Some("Invoice overdue".into()),
        body: Some("Pay within 24 hours to avoid suspension.".into()),
        anchor: Some(anchor),
        attachments: Some(vec![Attachment::new("http://files.example/bad.zip")]),
    }
}

fn bench_analyze(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let orch = orchestrator();

    for links in [0usize, 3, 30] {
        let req = email(links);
        c.bench_function(&format!("analyze_{}_links", links), |b| {
            b.iter(|| {
                let verdict = rt
                    .block_on(orch.analyze("bench", Ok(req.clone())))
                    .unwrap();
                black_box(verdict)
            })
        });
    }
}

fn bench_admission(c: &mut Criterion) {
    let limiters = RateLimiters::new(usize::MAX);
    c.bench_function("rate_limiter_admit", |b| {
        b.iter(|| black_box(limiters.admit(black_box("bench"))))
    });
}

criterion_group!(benches, bench_analyze, bench_admission);
criterion_main!(benches);
