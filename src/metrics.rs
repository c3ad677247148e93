//! Backend metrics.
//!
//! Counters are per backend instance so separate owner types (and separate
//! tests) never share state.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct BackendMetrics {
    /// `translation_for` returned an existing in-memory record
    lookup_hits: AtomicUsize,

    /// `translation_for` built a new record
    lookup_misses: AtomicUsize,

    /// Blank records removed before a save
    pruned: AtomicUsize,

    /// Records inserted or updated by successful saves
    committed: AtomicUsize,

    /// Rows removed by post-destroy cascades
    cascade_deleted: AtomicUsize,

    /// Cascade deletes that gave up (rows possibly orphaned)
    cascade_failures: AtomicUsize,
}

impl BackendMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup_hit(&self) {
        self.lookup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_miss(&self) {
        self.lookup_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pruned(&self, count: usize) {
        self.pruned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_committed(&self, count: usize) {
        self.committed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_cascade_deleted(&self, count: usize) {
        self.cascade_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_cascade_failure(&self) {
        self.cascade_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters.
    pub fn report(&self) -> MetricsReport {
        let hits = self.lookup_hits.load(Ordering::Relaxed);
        let misses = self.lookup_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let lookup_hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            lookup_hits: hits,
            lookup_misses: misses,
            lookup_hit_rate,
            pruned: self.pruned.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            cascade_deleted: self.cascade_deleted.load(Ordering::Relaxed),
            cascade_failures: self.cascade_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of `BackendMetrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub lookup_hits: usize,
    pub lookup_misses: usize,

    /// Hit rate as a percentage (0-100)
    pub lookup_hit_rate: f64,

    pub pruned: usize,
    pub committed: usize,
    pub cascade_deleted: usize,
    pub cascade_failures: usize,
}
