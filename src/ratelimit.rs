//! Sliding-window admission control.
//!
//! Each `RateLimiter` remembers the instants of the calls it admitted during
//! the last window.  `RateLimiters` keeps one limiter per identifier so
//! separate endpoints or callers never share a budget.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Length of the admission window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Source of "now" for the limiter.  Swappable so tests can move time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        self.base + *offset
    }
}

/// Admits at most `max_per_window` calls in any rolling `window`.
pub struct RateLimiter {
    max_per_window: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_window: usize) -> Self {
        Self::with_clock(max_per_window, DEFAULT_WINDOW, Arc::new(SystemClock))
    }

    pub fn with_clock(max_per_window: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_per_window,
            window,
            clock,
            admitted: Mutex::new(VecDeque::with_capacity(max_per_window.min(1024))),
        }
    }

    /// Decide whether one more call fits in the current window.  Rejected
    /// attempts are not recorded.
    pub fn admit(&self) -> bool {
        // Prune, count and record under a single lock so concurrent callers
        // cannot both take the last slot.
        let mut admitted = self.admitted.lock().unwrap_or_else(|p| p.into_inner());
        let now = self.clock.now();
        while let Some(oldest) = admitted.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
        if admitted.len() >= self.max_per_window {
            return false;
        }
        admitted.push_back(now);
        true
    }

    /// Calls admitted within the current window (stale entries excluded).
    pub fn in_window(&self) -> usize {
        let admitted = self.admitted.lock().unwrap_or_else(|p| p.into_inner());
        let now = self.clock.now();
        admitted
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.window)
            .count()
    }

    pub fn max_per_window(&self) -> usize {
        self.max_per_window
    }
}

/// Registry of independent limiters keyed by identifier.  Limiters are
/// created on first use with the registry's ceiling and window.
pub struct RateLimiters {
    max_per_window: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl RateLimiters {
    pub fn new(max_per_window: usize) -> Self {
        Self::with_clock(max_per_window, DEFAULT_WINDOW, Arc::new(SystemClock))
    }

    pub fn with_clock(max_per_window: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_per_window,
            window,
            clock,
            limiters: DashMap::new(),
        }
    }

    pub fn admit(&self, limiter_id: &str) -> bool {
        let admitted = self.limiter(limiter_id).admit();
        if !admitted {
            tracing::debug!(limiter = %limiter_id, max = self.max_per_window, "admission rejected");
        }
        admitted
    }

    pub fn limiter(&self, limiter_id: &str) -> Arc<RateLimiter> {
        if let Some(existing) = self.limiters.get(limiter_id) {
            return existing.clone();
        }
        self.limiters
            .entry(limiter_id.to_string())
            .or_insert_with(|| {
                Arc::new(RateLimiter::with_clock(
                    self.max_per_window,
                    self.window,
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    pub fn max_per_window(&self) -> usize {
        self.max_per_window
    }
}
