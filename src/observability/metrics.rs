//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start
//! - Thread-safe but lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of the orchestrator.
///
/// All counters use Relaxed ordering; readers only need eventual values.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    cycles_run: AtomicU64,
    collection_errors: AtomicU64,
    warnings_raised: AtomicU64,
    aborts: AtomicU64,
    state_store_errors: AtomicU64,
    failovers_started: AtomicU64,
    cas_conflicts: AtomicU64,
    promotion_attempts: AtomicU64,
    promotions_confirmed: AtomicU64,
    promotions_failed: AtomicU64,
    cutover_steps_applied: AtomicU64,
    cutover_step_retries: AtomicU64,
    cutovers_completed: AtomicU64,
    cutovers_degraded: AtomicU64,
    notifications_published: AtomicU64,
    notifications_dropped: AtomicU64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    counter!(increment_cycles, cycles_run);
    counter!(increment_collection_errors, collection_errors);
    counter!(increment_warnings, warnings_raised);
    counter!(increment_aborts, aborts);
    counter!(increment_state_store_errors, state_store_errors);
    counter!(increment_failovers_started, failovers_started);
    counter!(increment_cas_conflicts, cas_conflicts);
    counter!(increment_promotion_attempts, promotion_attempts);
    counter!(increment_promotions_confirmed, promotions_confirmed);
    counter!(increment_promotions_failed, promotions_failed);
    counter!(increment_cutover_steps, cutover_steps_applied);
    counter!(increment_cutover_step_retries, cutover_step_retries);
    counter!(increment_cutovers_completed, cutovers_completed);
    counter!(increment_cutovers_degraded, cutovers_degraded);
    counter!(increment_notifications_published, notifications_published);
    counter!(increment_notifications_dropped, notifications_dropped);

    /// Add several collection errors at once.
    pub fn add_collection_errors(&self, count: u64) {
        self.collection_errors.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            cycles_run: load(&self.cycles_run),
            collection_errors: load(&self.collection_errors),
            warnings_raised: load(&self.warnings_raised),
            aborts: load(&self.aborts),
            state_store_errors: load(&self.state_store_errors),
            failovers_started: load(&self.failovers_started),
            cas_conflicts: load(&self.cas_conflicts),
            promotion_attempts: load(&self.promotion_attempts),
            promotions_confirmed: load(&self.promotions_confirmed),
            promotions_failed: load(&self.promotions_failed),
            cutover_steps_applied: load(&self.cutover_steps_applied),
            cutover_step_retries: load(&self.cutover_step_retries),
            cutovers_completed: load(&self.cutovers_completed),
            cutovers_degraded: load(&self.cutovers_degraded),
            notifications_published: load(&self.notifications_published),
            notifications_dropped: load(&self.notifications_dropped),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles_run: u64,
    pub collection_errors: u64,
    pub warnings_raised: u64,
    pub aborts: u64,
    pub state_store_errors: u64,
    pub failovers_started: u64,
    pub cas_conflicts: u64,
    pub promotion_attempts: u64,
    pub promotions_confirmed: u64,
    pub promotions_failed: u64,
    pub cutover_steps_applied: u64,
    pub cutover_step_retries: u64,
    pub cutovers_completed: u64,
    pub cutovers_degraded: u64,
    pub notifications_published: u64,
    pub notifications_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_cycles();
        registry.increment_cycles();
        registry.increment_failovers_started();
        registry.increment_promotion_attempts();
        registry.increment_promotions_confirmed();
        registry.increment_cutover_steps();
        registry.add_collection_errors(3);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.cycles_run, 2);
        assert_eq!(snapshot.failovers_started, 1);
        assert_eq!(snapshot.promotion_attempts, 1);
        assert_eq!(snapshot.promotions_confirmed, 1);
        assert_eq!(snapshot.cutover_steps_applied, 1);
        assert_eq!(snapshot.collection_errors, 3);
        assert_eq!(snapshot.promotions_failed, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = MetricsRegistry::new();
        registry.increment_cas_conflicts();

        let parsed = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(parsed["cas_conflicts"], 1);
        assert_eq!(parsed["cycles_run"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_cycles();
                    reg.increment_notifications_published();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.cycles_run, 1000);
        assert_eq!(snapshot.notifications_published, 1000);
    }
}
