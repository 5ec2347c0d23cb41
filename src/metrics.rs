// Performance metrics module
//
// Lightweight counters for monitoring one client session

use crate::models::ServiceHealth;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Session metrics
///
/// Uses atomic operations for thread-safe tracking without locks. Counters
/// accumulate over the controller's lifetime and are logged on teardown.
/// The stale-discard counter is the observable side of the race-safety
/// contract: every superseded completion shows up here instead of in state.
#[derive(Debug)]
pub struct Metrics {
    /// Candidates rejected by the validator
    pub validation_rejections: AtomicUsize,

    /// Submissions started (request tokens minted)
    pub submissions_started: AtomicUsize,

    /// Submissions whose completion was applied successfully
    pub submissions_succeeded: AtomicUsize,

    /// Submissions whose failure was applied to state
    pub submissions_failed: AtomicUsize,

    /// Completions dropped because their request was superseded
    pub stale_completions_discarded: AtomicUsize,

    /// Liveness probes that found the service available
    pub probes_available: AtomicUsize,

    /// Liveness probes that found the service unavailable
    pub probes_unavailable: AtomicUsize,

    /// Session start time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            validation_rejections: AtomicUsize::new(0),
            submissions_started: AtomicUsize::new(0),
            submissions_succeeded: AtomicUsize::new(0),
            submissions_failed: AtomicUsize::new(0),
            stale_completions_discarded: AtomicUsize::new(0),
            probes_available: AtomicUsize::new(0),
            probes_unavailable: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_validation_rejected(&self) {
        self.validation_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_started(&self) {
        self.submissions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_succeeded(&self) {
        self.submissions_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_failed(&self) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_discard(&self) {
        self.stale_completions_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe(&self, health: ServiceHealth) {
        match health {
            ServiceHealth::Available => {
                self.probes_available.fetch_add(1, Ordering::Relaxed);
            }
            ServiceHealth::Unavailable => {
                self.probes_unavailable.fetch_add(1, Ordering::Relaxed);
            }
            ServiceHealth::Unknown => {}
        }
    }

    /// Get total session uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Submissions that reached a terminal outcome, applied or discarded
    pub fn submissions_settled(&self) -> usize {
        self.submissions_succeeded.load(Ordering::Relaxed)
            + self.submissions_failed.load(Ordering::Relaxed)
            + self.stale_completions_discarded.load(Ordering::Relaxed)
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Session Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Submissions: {} started, {} succeeded, {} failed, {} stale discarded",
            self.submissions_started.load(Ordering::Relaxed),
            self.submissions_succeeded.load(Ordering::Relaxed),
            self.submissions_failed.load(Ordering::Relaxed),
            self.stale_completions_discarded.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Validation rejections: {}",
            self.validation_rejections.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Probes: {} available, {} unavailable",
            self.probes_available.load(Ordering::Relaxed),
            self.probes_unavailable.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
