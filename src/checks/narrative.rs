use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{log_absorbed, Checked};
use crate::sources::{within, DecodingParams, TextGenerator};

/// Returned in place of the model's assessment when it cannot be obtained.
pub const ANALYSIS_FALLBACK: &str = "Could not analyze email content due to service error";

/// Coarse tone of the risk assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => f.write_str("Positive"),
            Sentiment::Neutral => f.write_str("Neutral"),
            Sentiment::Negative => f.write_str("Negative"),
        }
    }
}

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]+").unwrap());

fn label(word: &str) -> Option<Sentiment> {
    match word.to_ascii_lowercase().as_str() {
        "positive" => Some(Sentiment::Positive),
        "neutral" => Some(Sentiment::Neutral),
        "negative" => Some(Sentiment::Negative),
        _ => None,
    }
}

impl FromStr for Sentiment {
    type Err = String;

    /// Takes the first word of free text that names a label, ignoring case
    /// and punctuation: `"negative."`, `"Sentiment: Positive"` and
    /// `"NEUTRAL - mostly"` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WORD.find_iter(s)
            .find_map(|m| label(m.as_str()))
            .ok_or_else(|| format!("no sentiment label in {:?}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeResult {
    pub analysis: String,
    pub sentiment: Sentiment,
}

/// The assessment prompt for one email.
pub fn build_prompt(sender: &str, title: &str, body: &str) -> String {
    format!(
        "Analyze this email for phishing indicators:
Sender: {sender}
Subject: {title}
Body: {body}

Consider these aspects:
1. Urgency or threats in language
2. Suspicious sender address
3. Requests for sensitive information
4. Grammar/spelling errors
5. Mismatched URLs
6. Unusual requests

Provide:
- Phishing likelihood (High/Medium/Low)
- Key indicators found
- Recommended action
- Detailed explanation
"
    )
}

fn sentiment_prompt(analysis: &str) -> String {
    format!(
        "Classify this text's sentiment in one word (Positive/Neutral/Negative): {}",
        analysis
    )
}

/// Asks a generative model for a written risk assessment, then asks it
/// again to classify the tone of that assessment.
pub struct NarrativeAnalyzer {
    generator: Arc<dyn TextGenerator>,
    analysis_params: DecodingParams,
    sentiment_params: DecodingParams,
    call_timeout: Duration,
}

impl NarrativeAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>, call_timeout: Duration) -> Self {
        Self {
            generator,
            analysis_params: DecodingParams::analysis(),
            sentiment_params: DecodingParams::sentiment(),
            call_timeout,
        }
    }

    pub fn with_params(mut self, analysis: DecodingParams, sentiment: DecodingParams) -> Self {
        self.analysis_params = analysis;
        self.sentiment_params = sentiment;
        self
    }

    /// Free-text assessment for `prompt`, or `ANALYSIS_FALLBACK`.
    pub async fn analyze(&self, prompt: &str) -> Checked<String> {
        match within(
            self.call_timeout,
            self.generator.generate(prompt, &self.analysis_params),
        )
        .await
        {
            Ok(text) if !text.trim().is_empty() => Checked::Real(text.trim().to_string()),
            Ok(_) => {
                tracing::warn!(check = "narrative", "empty analysis from generator");
                Checked::Degraded(ANALYSIS_FALLBACK.to_string())
            }
            Err(err) => {
                log_absorbed("narrative", "analysis", &err);
                Checked::Degraded(ANALYSIS_FALLBACK.to_string())
            }
        }
    }

    /// One-word tone of `analysis`; `Neutral` when the call fails or the
    /// answer is not one of the three labels.
    pub async fn classify_sentiment(&self, analysis: &str) -> Checked<Sentiment> {
        let prompt = sentiment_prompt(analysis);
        match within(
            self.call_timeout,
            self.generator.generate(&prompt, &self.sentiment_params),
        )
        .await
        {
            Ok(text) => match text.parse::<Sentiment>() {
                Ok(sentiment) => Checked::Real(sentiment),
                Err(reason) => {
                    tracing::warn!(check = "narrative", reason = %reason, "unparseable sentiment");
                    Checked::Degraded(Sentiment::Neutral)
                }
            },
            Err(err) => {
                log_absorbed("narrative", "sentiment", &err);
                Checked::Degraded(Sentiment::Neutral)
            }
        }
    }

    /// Prompt, assess, then classify the assessment.  The two generator
    /// calls are sequential because the second consumes the first's output.
    pub async fn run(&self, sender: &str, title: &str, body: &str) -> Checked<NarrativeResult> {
        let prompt = build_prompt(sender, title, body);
        let analysis = self.analyze(&prompt).await;
        let sentiment = self.classify_sentiment(analysis.value()).await;
        let degraded = analysis.is_degraded() || sentiment.is_degraded();
        Checked::new(
            NarrativeResult {
                analysis: analysis.into_inner(),
                sentiment: sentiment.into_inner(),
            },
            degraded,
        )
    }
}
