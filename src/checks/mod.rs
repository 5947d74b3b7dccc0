//! The three independent scans run for every admitted email.
//!
//! Each check talks to its collaborators through the `sources` traits and
//! absorbs their failures at the point of origin.  What comes back is always
//! a usable value, tagged `Degraded` when some collaborator call failed so
//! the orchestrator can log and count it.

pub mod file_reputation;
pub mod narrative;
pub mod url_reputation;

pub use file_reputation::FileReputationChecker;
pub use narrative::{build_prompt, NarrativeAnalyzer, NarrativeResult, Sentiment};
pub use url_reputation::{ThreatFinding, UrlReputationChecker};

use crate::error::SourceError;

/// Result of a check: the value is always present, the variant records
/// whether it is complete or partly made of fallback defaults.
#[derive(Debug, Clone, PartialEq)]
pub enum Checked<T> {
    Real(T),
    Degraded(T),
}

impl<T> Checked<T> {
    pub(crate) fn new(value: T, degraded: bool) -> Self {
        if degraded {
            Checked::Degraded(value)
        } else {
            Checked::Real(value)
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Checked::Degraded(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Checked::Real(v) | Checked::Degraded(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Checked::Real(v) | Checked::Degraded(v) => v,
        }
    }
}

/// Log an absorbed collaborator failure.  Missing credentials are routine
/// and only logged at debug.
pub(crate) fn log_absorbed(check: &'static str, subject: &str, err: &SourceError) {
    if err.is_not_configured() {
        tracing::debug!(check, subject = %subject, "source not configured, using default");
    } else {
        tracing::warn!(check, subject = %subject, error = %err, "source call failed, using default");
    }
}
