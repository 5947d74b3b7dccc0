#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use phishscan::checks::{FileReputationChecker, NarrativeAnalyzer, UrlReputationChecker};
use phishscan::ratelimit::RateLimiters;
use phishscan::sources::{
    DecodingParams, ReputationSource, SourceReport, TextGenerator, ThreatSource,
};
use phishscan::{Orchestrator, SourceError};

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Scripted answer of a mock source or generator.
#[derive(Clone, Debug)]
pub enum Reply {
    Detections(u64),
    ThreatTypes(Vec<&'static str>),
    Text(&'static str),
    Fail,
    /// Answer only after the delay.
    Slow(Duration, Box<Reply>),
}

impl Reply {
    pub fn slow(delay_ms: u64, inner: Reply) -> Self {
        Reply::Slow(Duration::from_millis(delay_ms), Box::new(inner))
    }
}

async fn resolve(mut reply: Reply) -> Reply {
    loop {
        match reply {
            Reply::Slow(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            other => return other,
        }
    }
}

/// In-memory reputation source with per-URL answers and a call log.
pub struct MockReputation {
    kind: ThreatSource,
    replies: HashMap<String, Reply>,
    fallback: Reply,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockReputation {
    pub fn new(kind: ThreatSource) -> Self {
        Self {
            kind,
            replies: HashMap::new(),
            fallback: Reply::ThreatTypes(Vec::new()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    pub fn otherwise(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ReputationSource for MockReputation {
    fn kind(&self) -> ThreatSource {
        self.kind
    }

    async fn lookup(&self, url: &str) -> Result<SourceReport, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(url.to_string());
        let reply = self.replies.get(url).cloned().unwrap_or(self.fallback.clone());
        match resolve(reply).await {
            Reply::Detections(n) => Ok(SourceReport::detections(n)),
            Reply::ThreatTypes(types) => Ok(SourceReport::threat_types(types)),
            Reply::Text(_) => Err(SourceError::Parse("text reply from reputation mock".into())),
            Reply::Fail | Reply::Slow(..) => Err(SourceError::Status(503)),
        }
    }
}

/// In-memory text generator.  Sentiment prompts are recognised by their
/// leading instruction so one mock can script both stages.
pub struct MockGenerator {
    analysis: Reply,
    sentiment: Reply,
    prompts: Mutex<Vec<(String, DecodingParams)>>,
}

impl MockGenerator {
    pub fn new(analysis: Reply, sentiment: Reply) -> Self {
        Self {
            analysis,
            sentiment,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<(String, DecodingParams)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: &DecodingParams,
    ) -> Result<String, SourceError> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), *params));
        let reply = if prompt.starts_with("Classify this text's sentiment") {
            self.sentiment.clone()
        } else {
            self.analysis.clone()
        };
        match resolve(reply).await {
            Reply::Text(text) => Ok(text.to_string()),
            _ => Err(SourceError::Status(500)),
        }
    }
}

/// Collaborators of one test orchestrator, kept so tests can inspect calls.
pub struct Harness {
    pub primary: Arc<MockReputation>,
    pub secondary: Arc<MockReputation>,
    pub generator: Arc<MockGenerator>,
}

impl Harness {
    pub fn new(primary: MockReputation, secondary: MockReputation, generator: MockGenerator) -> Self {
        Self {
            primary: Arc::new(primary),
            secondary: Arc::new(secondary),
            generator: Arc::new(generator),
        }
    }

    /// Orchestrator over the mocks with the given admission ceiling.
    pub fn orchestrator(&self, max_per_minute: usize, call_timeout: Duration) -> Orchestrator {
        let limiters = Arc::new(RateLimiters::new(max_per_minute));
        let url_checker =
            UrlReputationChecker::new(self.primary.clone(), self.secondary.clone(), call_timeout)
                .with_concurrency(4);
        let file_checker = FileReputationChecker::new(self.primary.clone(), call_timeout);
        let narrative = NarrativeAnalyzer::new(self.generator.clone(), call_timeout);
        Orchestrator::new(limiters, url_checker, file_checker, narrative)
    }
}

pub fn quiet_generator() -> MockGenerator {
    MockGenerator::new(
        Reply::Text("Phishing likelihood: Low"),
        Reply::Text("Neutral"),
    )
}
