//! Metrics registry
//!
//! - Counters only, monotonic
//! - Reset only when the registry is created
//! - Relaxed atomics; exactness per counter, not across counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    local_edits: AtomicU64,
    foreign_inserts: AtomicU64,
    duplicate_foreign_inserts: AtomicU64,
    conflicting_writes: AtomicU64,
    conflicts_detected: AtomicU64,
    projections_materialized: AtomicU64,
    sequences_allocated: AtomicU64,
    storage_failures: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_local_edits(&self) {
        self.local_edits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_foreign_inserts(&self) {
        self.foreign_inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_duplicate_foreign_inserts(&self) {
        self.duplicate_foreign_inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conflicting_writes(&self) {
        self.conflicting_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conflicts_detected(&self) {
        self.conflicts_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_projections_materialized(&self) {
        self.projections_materialized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sequences_allocated(&self) {
        self.sequences_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_storage_failures(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            local_edits: self.local_edits.load(Ordering::Relaxed),
            foreign_inserts: self.foreign_inserts.load(Ordering::Relaxed),
            duplicate_foreign_inserts: self.duplicate_foreign_inserts.load(Ordering::Relaxed),
            conflicting_writes: self.conflicting_writes.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            projections_materialized: self.projections_materialized.load(Ordering::Relaxed),
            sequences_allocated: self.sequences_allocated.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }

    /// Snapshot as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub local_edits: u64,
    pub foreign_inserts: u64,
    pub duplicate_foreign_inserts: u64,
    pub conflicting_writes: u64,
    pub conflicts_detected: u64,
    pub projections_materialized: u64,
    pub sequences_allocated: u64,
    pub storage_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_registry_has_zero_values() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();
        registry.increment_local_edits();
        registry.increment_local_edits();
        registry.increment_conflicting_writes();
        registry.increment_sequences_allocated();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.local_edits, 2);
        assert_eq!(snapshot.conflicting_writes, 1);
        assert_eq!(snapshot.sequences_allocated, 1);
        assert_eq!(snapshot.foreign_inserts, 0);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.increment_foreign_inserts();
        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["foreign_inserts"], 1);
        assert_eq!(parsed["local_edits"], 0);
    }

    #[test]
    fn test_thread_safety() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..250 {
                        registry.increment_sequences_allocated();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().sequences_allocated, 1000);
    }
}
