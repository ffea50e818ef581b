//! Per-backend dispatch counters.
//!
//! Shared by reference from the router's stats map and bumped lock-free
//! from every attempt, success or not.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct BackendStats {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    total_latency_ms: AtomicU64,
}

impl BackendStats {
    pub fn record_success(&self, latency_ms: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency_ms: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BackendStatsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);
        BackendStatsSnapshot {
            requests,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            avg_latency_ms: if requests == 0 {
                0.0
            } else {
                total_latency_ms as f64 / requests as f64
            },
        }
    }
}

/// Point-in-time copy of one backend's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
}

/// Registration details plus counters, as reported by `Router::backend_info`.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub weight: u32,
    pub default_model: Option<String>,
    pub stats: BackendStatsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_outcomes() {
        let stats = BackendStats::default();
        stats.record_success(100);
        stats.record_success(200);
        stats.record_failure(60);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 3);
        assert_eq!(snapshot.successes, 2);
        assert_eq!(snapshot.failures, 1);
        assert!((snapshot.avg_latency_ms - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_snapshot_has_zero_average() {
        let snapshot = BackendStats::default().snapshot();
        assert_eq!(snapshot.requests, 0);
        assert_eq!(snapshot.avg_latency_ms, 0.0);
    }
}
