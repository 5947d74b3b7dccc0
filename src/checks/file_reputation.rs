use std::sync::Arc;
use std::time::Duration;

use super::{log_absorbed, Checked};
use crate::sources::{within, ReputationSource};

/// Reduces attachment lookups to the highest detection count seen.
///
/// A score of 0 means either "clean" or "nothing could be checked"; the
/// `Degraded` tag is the only hint of the latter.
pub struct FileReputationChecker {
    source: Arc<dyn ReputationSource>,
    call_timeout: Duration,
}

impl FileReputationChecker {
    pub fn new(source: Arc<dyn ReputationSource>, call_timeout: Duration) -> Self {
        Self {
            source,
            call_timeout,
        }
    }

    pub async fn check_files(&self, refs: &[String]) -> Checked<u64> {
        let mut max_detections = 0u64;
        let mut degraded = false;
        for file_ref in refs {
            match within(self.call_timeout, self.source.lookup(file_ref)).await {
                Ok(report) => {
                    let detections = report.detections.unwrap_or(0);
                    if detections > 0 {
                        tracing::info!(file = %file_ref, detections, "attachment flagged");
                    }
                    max_detections = max_detections.max(detections);
                }
                Err(err) => {
                    log_absorbed("file_reputation", file_ref, &err);
                    degraded = true;
                }
            }
        }
        Checked::new(max_detections, degraded)
    }
}
