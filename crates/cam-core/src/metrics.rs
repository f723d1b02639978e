//! Global atomic counters for compliance monitoring.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. on a daemon tick or at shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    collections_triggered: AtomicU64,
    evidence_received: AtomicU64,
    evidence_forwarded: AtomicU64,
    evidence_dropped: AtomicU64,
    results_recorded: AtomicU64,
    compliance_recomputed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            collections_triggered: AtomicU64::new(0),
            evidence_received: AtomicU64::new(0),
            evidence_forwarded: AtomicU64::new(0),
            evidence_dropped: AtomicU64::new(0),
            results_recorded: AtomicU64::new(0),
            compliance_recomputed: AtomicU64::new(0),
        }
    }

    pub fn inc_collections_triggered(&self) {
        self.collections_triggered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "collections_triggered", "counter incremented");
    }

    pub fn inc_evidence_received(&self) {
        self.evidence_received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evidence_received", "counter incremented");
    }

    pub fn inc_evidence_forwarded(&self) {
        self.evidence_forwarded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evidence_forwarded", "counter incremented");
    }

    pub fn inc_evidence_dropped(&self) {
        self.evidence_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evidence_dropped", "counter incremented");
    }

    pub fn inc_results_recorded(&self) {
        self.results_recorded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "results_recorded", "counter incremented");
    }

    pub fn inc_compliance_recomputed(&self) {
        self.compliance_recomputed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "compliance_recomputed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            collections_triggered = self.collections_triggered(),
            evidence_received = self.evidence_received(),
            evidence_forwarded = self.evidence_forwarded(),
            evidence_dropped = self.evidence_dropped(),
            results_recorded = self.results_recorded(),
            compliance_recomputed = self.compliance_recomputed(),
        );
    }

    pub fn collections_triggered(&self) -> u64 {
        self.collections_triggered.load(Ordering::Relaxed)
    }

    pub fn evidence_received(&self) -> u64 {
        self.evidence_received.load(Ordering::Relaxed)
    }

    pub fn evidence_forwarded(&self) -> u64 {
        self.evidence_forwarded.load(Ordering::Relaxed)
    }

    pub fn evidence_dropped(&self) -> u64 {
        self.evidence_dropped.load(Ordering::Relaxed)
    }

    pub fn results_recorded(&self) -> u64 {
        self.results_recorded.load(Ordering::Relaxed)
    }

    pub fn compliance_recomputed(&self) -> u64 {
        self.compliance_recomputed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.collections_triggered.store(0, Ordering::Relaxed);
        self.evidence_received.store(0, Ordering::Relaxed);
        self.evidence_forwarded.store(0, Ordering::Relaxed);
        self.evidence_dropped.store(0, Ordering::Relaxed);
        self.results_recorded.store(0, Ordering::Relaxed);
        self.compliance_recomputed.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.evidence_received(), 0);
        m.inc_evidence_received();
        m.inc_evidence_received();
        assert_eq!(m.evidence_received(), 2);

        m.inc_evidence_forwarded();
        assert_eq!(m.evidence_forwarded(), 1);

        m.inc_compliance_recomputed();
        m.inc_compliance_recomputed();
        m.inc_compliance_recomputed();
        assert_eq!(m.compliance_recomputed(), 3);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_collections_triggered();
        m.inc_evidence_dropped();
        m.inc_results_recorded();
        m.reset();
        assert_eq!(m.collections_triggered(), 0);
        assert_eq!(m.evidence_dropped(), 0);
        assert_eq!(m.results_recorded(), 0);
    }
}
