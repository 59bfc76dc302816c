//! Health Signal Collector
//!
//! Probes every configured region concurrently, bounds each probe with a
//! timeout, and appends the result to that region's bounded history.
//! A failing region never blocks collection for the others: the report
//! always carries every snapshot that could be gathered alongside the
//! per-region errors.
//!
//! Adapter failures (the probe hung or its backend errored) append no
//! sample. They neither advance nor reset the failure run for the region.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, warn};

use super::errors::{CollectionCause, CollectionError, ProbeError};
use super::snapshot::{HealthHistory, HealthSnapshot, ProbeReport};
use crate::observability::Event;
use crate::region::{Endpoint, RegionId, RegionSpec};

/// Read-only health probe against an externally owned endpoint.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the endpoint once.
    async fn probe(&self, endpoint: &Endpoint) -> Result<ProbeReport, ProbeError>;
}

/// Result of one collection round.
#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    /// Snapshots recorded this round
    pub snapshots: BTreeMap<RegionId, HealthSnapshot>,
    /// Regions that could not be collected
    pub errors: Vec<CollectionError>,
}

impl CollectionReport {
    /// True when every region produced a snapshot.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Polls all regions and owns their histories.
pub struct HealthSignalCollector {
    regions: Vec<RegionSpec>,
    probe: Arc<dyn HealthProbe>,
    probe_timeout: Duration,
    histories: BTreeMap<RegionId, HealthHistory>,
}

impl HealthSignalCollector {
    /// Create a collector with an empty history per region.
    pub fn new(
        regions: Vec<RegionSpec>,
        probe: Arc<dyn HealthProbe>,
        probe_timeout: Duration,
        history_capacity: usize,
    ) -> Self {
        let histories = regions
            .iter()
            .map(|r| (r.id.clone(), HealthHistory::new(history_capacity)))
            .collect();

        Self {
            regions,
            probe,
            probe_timeout,
            histories,
        }
    }

    /// Probe every region once.
    pub async fn poll(&mut self) -> CollectionReport {
        let timeout = self.probe_timeout;
        let results = join_all(self.regions.iter().map(|region| {
            let probe = Arc::clone(&self.probe);
            async move {
                let outcome = tokio::time::timeout(timeout, probe.probe(&region.endpoint)).await;
                let outcome = match outcome {
                    Ok(Ok(report)) => Ok(report),
                    Ok(Err(e)) => Err(CollectionCause::Probe(e)),
                    Err(_) => Err(CollectionCause::Timeout(timeout)),
                };
                (region.id.clone(), outcome)
            }
        }))
        .await;

        let mut report = CollectionReport::default();
        for (region, outcome) in results {
            match outcome {
                Ok(probe_report) => {
                    let history = self
                        .histories
                        .entry(region.clone())
                        .or_insert_with(HealthHistory::default);
                    let snapshot = history.record(probe_report);
                    debug!(
                        event = Event::HealthSample.as_str(),
                        region = %region,
                        reachable = snapshot.reachable,
                        consecutive_failures = snapshot.consecutive_failures,
                        lag = ?snapshot.replication_lag,
                    );
                    report.snapshots.insert(region, snapshot);
                }
                Err(cause) => {
                    let err = CollectionError::new(region, cause);
                    warn!(
                        event = Event::CollectionFailed.as_str(),
                        region = %err.region,
                        error = %err.cause,
                    );
                    report.errors.push(err);
                }
            }
        }

        report
    }

    /// All region histories.
    pub fn histories(&self) -> &BTreeMap<RegionId, HealthHistory> {
        &self.histories
    }

    /// History for one region.
    pub fn history(&self, region: &RegionId) -> Option<&HealthHistory> {
        self.histories.get(region)
    }

    /// Configured regions.
    pub fn regions(&self) -> &[RegionSpec] {
        &self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryProbe;

    fn regions() -> Vec<RegionSpec> {
        vec![
            RegionSpec::new("us-east-1", Endpoint::new("db.use1:5432")),
            RegionSpec::new("us-west-2", Endpoint::new("db.usw2:5432")),
            RegionSpec::new("eu-west-1", Endpoint::new("db.euw1:5432")),
        ]
    }

    #[tokio::test]
    async fn test_poll_records_every_region() {
        let probe = Arc::new(MemoryProbe::new());
        probe.set_reachable("db.use1:5432", None);
        probe.set_reachable("db.usw2:5432", Some(Duration::from_secs(2)));
        probe.set_unreachable("db.euw1:5432");

        let mut collector =
            HealthSignalCollector::new(regions(), probe, Duration::from_millis(200), 10);
        let report = collector.poll().await;

        assert!(report.is_complete());
        assert_eq!(report.snapshots.len(), 3);
        assert!(!report.snapshots[&RegionId::new("eu-west-1")].reachable);
        assert_eq!(
            report.snapshots[&RegionId::new("us-west-2")].replication_lag,
            Some(Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn test_failing_region_returns_partial_results() {
        let probe = Arc::new(MemoryProbe::new());
        probe.set_reachable("db.use1:5432", None);
        probe.set_failing("db.usw2:5432", "health api 503");
        probe.set_reachable("db.euw1:5432", None);

        let mut collector =
            HealthSignalCollector::new(regions(), probe, Duration::from_millis(200), 10);
        let report = collector.poll().await;

        assert_eq!(report.snapshots.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].region, RegionId::new("us-west-2"));
        assert!(!report.errors[0].is_timeout());
        // no sample appended for the failed region
        assert!(collector.history(&RegionId::new("us-west-2")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hanging_probe_times_out_without_blocking_others() {
        let probe = Arc::new(MemoryProbe::new());
        probe.set_reachable("db.use1:5432", None);
        probe.set_hanging("db.usw2:5432");
        probe.set_reachable("db.euw1:5432", None);

        let mut collector =
            HealthSignalCollector::new(regions(), probe, Duration::from_millis(50), 10);
        let started = std::time::Instant::now();
        let report = collector.poll().await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.snapshots.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].is_timeout());
    }

    #[tokio::test]
    async fn test_history_accumulates_across_polls() {
        let probe = Arc::new(MemoryProbe::new());
        probe.set_unreachable("db.use1:5432");
        probe.set_reachable("db.usw2:5432", None);
        probe.set_reachable("db.euw1:5432", None);

        let mut collector =
            HealthSignalCollector::new(regions(), probe, Duration::from_millis(200), 2);
        for _ in 0..3 {
            collector.poll().await;
        }

        let primary = collector.history(&RegionId::new("us-east-1")).unwrap();
        assert_eq!(primary.len(), 2);
        assert_eq!(primary.consecutive_failures(), 3);
    }
}
