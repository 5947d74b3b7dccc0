//! Process-wide counters and a latency histogram, exposed in Prometheus text
//! format on `/metrics`.  Nothing here is read back by the analysis path.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Upper bounds (ms) of the request latency histogram.  Analyses wait on
/// remote services, so buckets are much wider than for local work.
const LATENCY_BUCKETS_MS: [u64; 10] = [50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000, 60000];

/// Checks whose degradations are counted separately.
pub const CHECK_NAMES: [&str; 3] = ["url_reputation", "file_reputation", "narrative"];

pub struct Metrics {
    requests_total: AtomicU64,
    verdicts_total: AtomicU64,
    rate_limited_total: AtomicU64,
    invalid_total: AtomicU64,
    internal_errors_total: AtomicU64,
    degraded_total: [AtomicU64; 3],
    hist_counts: Vec<AtomicU64>,
    hist_sum_ms: AtomicU64,
    hist_count: AtomicU64,
    process_start_epoch: f64,
    process_start_instant: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            verdicts_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            invalid_total: AtomicU64::new(0),
            internal_errors_total: AtomicU64::new(0),
            degraded_total: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            hist_counts: LATENCY_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            hist_sum_ms: AtomicU64::new(0),
            hist_count: AtomicU64::new(0),
            process_start_epoch: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            process_start_instant: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_internal_error(&self) {
        self.internal_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self, check: &str) {
        if let Some(idx) = CHECK_NAMES.iter().position(|c| *c == check) {
            self.degraded_total[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a completed verdict and its end-to-end latency.
    pub fn record_verdict(&self, latency_ms: u64) {
        self.verdicts_total.fetch_add(1, Ordering::Relaxed);
        self.hist_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        // first bucket >= value
        for (idx, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if latency_ms <= *ub {
                self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn rate_limited_total(&self) -> u64 {
        self.rate_limited_total.load(Ordering::Relaxed)
    }

    pub fn degraded_total(&self, check: &str) -> u64 {
        CHECK_NAMES
            .iter()
            .position(|c| *c == check)
            .map(|idx| self.degraded_total[idx].load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn render(&self) -> String {
        let mut buf = String::new();
        let counters = [
            (
                "phishscan_requests_total",
                "Analyze requests received",
                &self.requests_total,
            ),
            (
                "phishscan_verdicts_total",
                "Verdicts returned",
                &self.verdicts_total,
            ),
            (
                "phishscan_rate_limited_total",
                "Requests rejected by the rate limiter",
                &self.rate_limited_total,
            ),
            (
                "phishscan_invalid_total",
                "Requests rejected as invalid input",
                &self.invalid_total,
            ),
            (
                "phishscan_internal_errors_total",
                "Requests that ended in an internal error",
                &self.internal_errors_total,
            ),
        ];
        for (name, help, value) in counters {
            writeln!(&mut buf, "# HELP {} {}", name, help).ok();
            writeln!(&mut buf, "# TYPE {} counter", name).ok();
            writeln!(&mut buf, "{} {}", name, value.load(Ordering::Relaxed)).ok();
        }

        writeln!(
            &mut buf,
            "# HELP phishscan_check_degraded_total Checks that fell back to defaults\n# TYPE phishscan_check_degraded_total counter"
        )
        .ok();
        for (idx, check) in CHECK_NAMES.iter().enumerate() {
            writeln!(
                &mut buf,
                "phishscan_check_degraded_total{{check=\"{}\"}} {}",
                check,
                self.degraded_total[idx].load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(
            &mut buf,
            "# HELP phishscan_request_latency_ms Verdict latency histogram milliseconds"
        )
        .ok();
        writeln!(&mut buf, "# TYPE phishscan_request_latency_ms histogram").ok();
        let count = self.hist_count.load(Ordering::Relaxed);
        let mut cumulative: u64 = 0;
        for (i, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            cumulative += self.hist_counts[i].load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "phishscan_request_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        writeln!(
            &mut buf,
            "phishscan_request_latency_ms_bucket{{le=\"+Inf\"}} {}",
            count
        )
        .ok();
        writeln!(
            &mut buf,
            "phishscan_request_latency_ms_sum {}",
            self.hist_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(&mut buf, "phishscan_request_latency_ms_count {}", count).ok();

        writeln!(
            &mut buf,
            "# HELP phishscan_build_info Build information\n# TYPE phishscan_build_info gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "phishscan_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP phishscan_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE phishscan_process_start_time_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "phishscan_process_start_time_seconds {}",
            self.process_start_epoch
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP phishscan_process_uptime_seconds Process uptime seconds\n# TYPE phishscan_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "phishscan_process_uptime_seconds {}",
            self.process_start_instant.elapsed().as_secs_f64()
        )
        .ok();
        buf
    }
}
