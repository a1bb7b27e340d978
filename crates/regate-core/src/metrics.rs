//! Global atomic counters for validation observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a validation run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocation and no locking.
pub struct Metrics {
    validations_run: AtomicU64,
    issues_emitted: AtomicU64,
    issues_suppressed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            validations_run: AtomicU64::new(0),
            issues_emitted: AtomicU64::new(0),
            issues_suppressed: AtomicU64::new(0),
        }
    }

    pub fn inc_validations(&self) {
        self.validations_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "validations_run", "counter incremented");
    }

    /// Add `n` classified issues (before whitelisting).
    pub fn add_issues_emitted(&self, n: u64) {
        self.issues_emitted.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "issues_emitted", n = n, "counter incremented");
    }

    pub fn inc_issues_suppressed(&self) {
        self.issues_suppressed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "issues_suppressed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            validations_run = self.validations_run(),
            issues_emitted = self.issues_emitted(),
            issues_suppressed = self.issues_suppressed(),
        );
    }

    pub fn validations_run(&self) -> u64 {
        self.validations_run.load(Ordering::Relaxed)
    }

    pub fn issues_emitted(&self) -> u64 {
        self.issues_emitted.load(Ordering::Relaxed)
    }

    pub fn issues_suppressed(&self) -> u64 {
        self.issues_suppressed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_validations();
        m.add_issues_emitted(4);
        m.add_issues_emitted(1);
        m.inc_issues_suppressed();
        assert_eq!(m.validations_run(), 1);
        assert_eq!(m.issues_emitted(), 5);
        assert_eq!(m.issues_suppressed(), 1);
    }
}
