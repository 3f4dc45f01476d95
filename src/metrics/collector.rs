//! Bridge Counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime counters for connections and extraction requests
#[derive(Debug, Default)]
pub struct Metrics {
    connections_accepted: AtomicU64,
    connections_refused: AtomicU64,
    requests_issued: AtomicU64,
    requests_resolved: AtomicU64,
    requests_failed: AtomicU64,
    requests_timed_out: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_refused(&self) {
        self.connections_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_issued(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_resolved(&self) {
        self.requests_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_timed_out(&self) {
        self.requests_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_refused: self.connections_refused.load(Ordering::Relaxed),
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            requests_resolved: self.requests_resolved.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_timed_out: self.requests_timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counter snapshot for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_refused: u64,
    pub requests_issued: u64,
    pub requests_resolved: u64,
    pub requests_failed: u64,
    pub requests_timed_out: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.connections_accepted, 0);
        assert_eq!(snapshot.requests_issued, 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();

        metrics.record_connection_accepted();
        metrics.record_connection_refused();
        metrics.record_request_issued();
        metrics.record_request_issued();
        metrics.record_request_resolved();
        metrics.record_request_timed_out();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_accepted, 1);
        assert_eq!(snapshot.connections_refused, 1);
        assert_eq!(snapshot.requests_issued, 2);
        assert_eq!(snapshot.requests_resolved, 1);
        assert_eq!(snapshot.requests_failed, 0);
        assert_eq!(snapshot.requests_timed_out, 1);
    }
}
