use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Keeps a reserve of API calls untouched. The crawl may only start another
/// expansion while the upstream window has more than `safety_threshold` calls left.
/// Thread-safe via atomic operations.
pub struct QuotaGuard {
    safety_threshold: u64,
    /// Last remaining count seen. u64::MAX until the first check.
    last_remaining: AtomicU64,
    /// Number of checks made this run.
    checks: AtomicU64,
}

impl QuotaGuard {
    pub fn new(safety_threshold: u64) -> Self {
        Self {
            safety_threshold,
            last_remaining: AtomicU64::new(u64::MAX),
            checks: AtomicU64::new(0),
        }
    }

    /// Whether `remaining` calls leave room for one more expansion.
    pub fn permits(&self, remaining: u64) -> bool {
        self.last_remaining.store(remaining, Ordering::Relaxed);
        self.checks.fetch_add(1, Ordering::Relaxed);
        if remaining > self.safety_threshold {
            return true;
        }
        warn!(
            remaining,
            threshold = self.safety_threshold,
            "Quota at safety threshold"
        );
        false
    }

    pub fn safety_threshold(&self) -> u64 {
        self.safety_threshold
    }

    /// Last remaining count seen, if any check has run.
    pub fn last_remaining(&self) -> Option<u64> {
        match self.last_remaining.load(Ordering::Relaxed) {
            u64::MAX => None,
            n => Some(n),
        }
    }

    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    /// Log quota status.
    pub fn log_status(&self) {
        info!(
            last_remaining = ?self.last_remaining(),
            threshold = self.safety_threshold,
            checks = self.checks(),
            "Quota status"
        );
    }
}
