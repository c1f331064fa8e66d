//! Supervision counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters recorded by the lifecycle supervisor
#[derive(Debug, Default)]
pub struct Metrics {
    ticks_started: AtomicU64,
    ticks_succeeded: AtomicU64,
    ticks_failed: AtomicU64,
    overlapping_calls: AtomicU64,
    time_warnings: AtomicU64,
    audit_write_failures: AtomicU64,
    orphaned_starts: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_started(&self) {
        self.ticks_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "ticks_started", "Metric incremented");
    }

    pub fn tick_completed(&self, failed: bool) {
        if failed {
            self.ticks_failed.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(counter = "ticks_failed", "Metric incremented");
        } else {
            self.ticks_succeeded.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(counter = "ticks_succeeded", "Metric incremented");
        }
    }

    pub fn overlapping_call(&self) {
        self.overlapping_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "overlapping_calls", "Metric incremented");
    }

    pub fn time_warning(&self) {
        self.time_warnings.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "time_warnings", "Metric incremented");
    }

    pub fn audit_write_failed(&self) {
        self.audit_write_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "audit_write_failures", "Metric incremented");
    }

    pub fn orphaned_start(&self) {
        self.orphaned_starts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "orphaned_starts", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_started: self.ticks_started.load(Ordering::Relaxed),
            ticks_succeeded: self.ticks_succeeded.load(Ordering::Relaxed),
            ticks_failed: self.ticks_failed.load(Ordering::Relaxed),
            overlapping_calls: self.overlapping_calls.load(Ordering::Relaxed),
            time_warnings: self.time_warnings.load(Ordering::Relaxed),
            audit_write_failures: self.audit_write_failures.load(Ordering::Relaxed),
            orphaned_starts: self.orphaned_starts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks_started: u64,
    pub ticks_succeeded: u64,
    pub ticks_failed: u64,
    pub overlapping_calls: u64,
    pub time_warnings: u64,
    pub audit_write_failures: u64,
    pub orphaned_starts: u64,
}
