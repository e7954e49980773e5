//! Global atomic counters for evaluation observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of an evaluation).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    runs_executed: AtomicU64,
    judge_calls: AtomicU64,
    judge_retries: AtomicU64,
    judge_timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_executed: AtomicU64::new(0),
            judge_calls: AtomicU64::new(0),
            judge_retries: AtomicU64::new(0),
            judge_timeouts: AtomicU64::new(0),
        }
    }

    /// Increment the runs-executed counter by one.
    pub fn inc_runs(&self) {
        self.runs_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_executed", "counter incremented");
    }

    /// Increment the judge-calls counter by one (one per attempt).
    pub fn inc_judge_calls(&self) {
        self.judge_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "judge_calls", "counter incremented");
    }

    pub fn inc_judge_retries(&self) {
        self.judge_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "judge_retries", "counter incremented");
    }

    pub fn inc_judge_timeouts(&self) {
        self.judge_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "judge_timeouts", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_executed = self.runs_executed(),
            judge_calls = self.judge_calls(),
            judge_retries = self.judge_retries(),
            judge_timeouts = self.judge_timeouts(),
        );
    }

    pub fn runs_executed(&self) -> u64 {
        self.runs_executed.load(Ordering::Relaxed)
    }

    pub fn judge_calls(&self) -> u64 {
        self.judge_calls.load(Ordering::Relaxed)
    }

    pub fn judge_retries(&self) -> u64 {
        self.judge_retries.load(Ordering::Relaxed)
    }

    pub fn judge_timeouts(&self) -> u64 {
        self.judge_timeouts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_executed.store(0, Ordering::Relaxed);
        self.judge_calls.store(0, Ordering::Relaxed);
        self.judge_retries.store(0, Ordering::Relaxed);
        self.judge_timeouts.store(0, Ordering::Relaxed);
    }
}
