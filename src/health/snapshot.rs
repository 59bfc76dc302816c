//! Health samples and bounded per-region history
//!
//! Snapshots are immutable once recorded. The history keeps only the
//! newest `capacity` samples; the policy evaluator works from the
//! consecutive-failure count carried on the newest sample, never from a
//! single reachability bit.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of samples retained per region.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Raw result of one probe, as returned by a `HealthProbe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Whether the endpoint answered
    pub reachable: bool,
    /// Replication lag behind the primary, when the probe can measure it
    pub replication_lag: Option<Duration>,
    /// When the probe observed the endpoint
    pub timestamp: DateTime<Utc>,
}

impl ProbeReport {
    /// A reachable endpoint with the given lag.
    pub fn reachable(replication_lag: Option<Duration>) -> Self {
        Self {
            reachable: true,
            replication_lag,
            timestamp: Utc::now(),
        }
    }

    /// An endpoint that did not answer.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            replication_lag: None,
            timestamp: Utc::now(),
        }
    }
}

/// One recorded health sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub reachable: bool,
    pub replication_lag: Option<Duration>,
    /// Unreachable samples in a row, including this one. Zero when reachable.
    pub consecutive_failures: u32,
}

/// Bounded, append-only sample history for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthHistory {
    capacity: usize,
    samples: VecDeque<HealthSnapshot>,
}

impl Default for HealthHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HealthHistory {
    /// Create an empty history. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a probe result, deriving the consecutive-failure count from
    /// the previous sample. Evicts the oldest sample when full.
    pub fn record(&mut self, report: ProbeReport) -> HealthSnapshot {
        let consecutive_failures = if report.reachable {
            0
        } else {
            self.latest()
                .map(|s| s.consecutive_failures)
                .unwrap_or(0)
                .saturating_add(1)
        };

        let snapshot = HealthSnapshot {
            timestamp: report.timestamp,
            reachable: report.reachable,
            replication_lag: report.replication_lag,
            consecutive_failures,
        };

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(snapshot.clone());
        snapshot
    }

    /// Newest sample, if any.
    pub fn latest(&self) -> Option<&HealthSnapshot> {
        self.samples.back()
    }

    /// Consecutive unreachable samples ending at the newest one.
    pub fn consecutive_failures(&self) -> u32 {
        self.latest().map(|s| s.consecutive_failures).unwrap_or(0)
    }

    /// Samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HealthSnapshot> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_failures_accumulate_and_reset() {
        let mut history = HealthHistory::new(10);

        history.record(ProbeReport::unreachable());
        history.record(ProbeReport::unreachable());
        assert_eq!(history.consecutive_failures(), 2);

        history.record(ProbeReport::reachable(None));
        assert_eq!(history.consecutive_failures(), 0);

        let snap = history.record(ProbeReport::unreachable());
        assert_eq!(snap.consecutive_failures, 1);
    }

    #[test]
    fn test_oldest_sample_evicted_at_capacity() {
        let mut history = HealthHistory::new(3);
        for secs in 1..=5 {
            history.record(ProbeReport::reachable(Some(Duration::from_secs(secs))));
        }

        assert_eq!(history.len(), 3);
        let lags: Vec<_> = history
            .iter()
            .map(|s| s.replication_lag.unwrap().as_secs())
            .collect();
        assert_eq!(lags, vec![3, 4, 5]);
    }

    #[test]
    fn test_failure_count_survives_eviction() {
        // The run length is carried on the sample, so a short window does
        // not cap how long a region is observed to be down.
        let mut history = HealthHistory::new(2);
        for _ in 0..5 {
            history.record(ProbeReport::unreachable());
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.consecutive_failures(), 5);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut history = HealthHistory::new(0);
        history.record(ProbeReport::unreachable());
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_empty_history() {
        let history = HealthHistory::default();
        assert!(history.is_empty());
        assert!(history.latest().is_none());
        assert_eq!(history.consecutive_failures(), 0);
    }
}
