//! In-memory adapters
//!
//! Deterministic implementations of every external interface, with
//! failure injection. Used by tests, simulations and dry runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::cutover::{RoutingChange, RoutingControl, RoutingError};
use crate::health::{HealthProbe, ProbeError, ProbeReport};
use crate::notify::{NotificationEnvelope, PublishError, Publisher};
use crate::promotion::{PrimitiveError, PromotionPrimitive, TargetStatus};
use crate::region::{Endpoint, RegionId};
use crate::state::{StateBackend, StateResult, StateStoreError};

/// Poisoning only happens after a test assertion already panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// HEALTH PROBE
// =============================================================================

#[derive(Debug, Clone)]
enum ProbeBehavior {
    Reachable(Option<Duration>),
    Unreachable,
    Failing(String),
    Hanging,
}

/// Scripted probe keyed by endpoint address. Unknown endpoints are unreachable.
#[derive(Debug, Default)]
pub struct MemoryProbe {
    behaviors: Mutex<HashMap<String, ProbeBehavior>>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, address: &str, lag: Option<Duration>) {
        self.set(address, ProbeBehavior::Reachable(lag));
    }

    pub fn set_unreachable(&self, address: &str) {
        self.set(address, ProbeBehavior::Unreachable);
    }

    /// Probe backend errors (no sample is recorded).
    pub fn set_failing(&self, address: &str, message: &str) {
        self.set(address, ProbeBehavior::Failing(message.to_string()));
    }

    /// Probe never returns.
    pub fn set_hanging(&self, address: &str) {
        self.set(address, ProbeBehavior::Hanging);
    }

    fn set(&self, address: &str, behavior: ProbeBehavior) {
        lock(&self.behaviors).insert(address.to_string(), behavior);
    }
}

#[async_trait]
impl HealthProbe for MemoryProbe {
    async fn probe(&self, endpoint: &Endpoint) -> Result<ProbeReport, ProbeError> {
        let behavior = lock(&self.behaviors)
            .get(&endpoint.address)
            .cloned()
            .unwrap_or(ProbeBehavior::Unreachable);

        match behavior {
            ProbeBehavior::Reachable(lag) => Ok(ProbeReport::reachable(lag)),
            ProbeBehavior::Unreachable => Ok(ProbeReport::unreachable()),
            ProbeBehavior::Failing(message) => Err(ProbeError::Unavailable(message)),
            ProbeBehavior::Hanging => std::future::pending().await,
        }
    }
}

// =============================================================================
// STATE BACKEND
// =============================================================================

/// Linearizable key-value map. Every call holds one lock, so `cas_put` is atomic.
#[derive(Debug)]
pub struct MemoryStateBackend {
    values: Mutex<HashMap<String, Vec<u8>>>,
    available: AtomicBool,
}

impl Default for MemoryStateBackend {
    fn default() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Store bytes without any check.
    pub fn insert_raw(&self, key: &str, value: Vec<u8>) {
        lock(&self.values).insert(key.to_string(), value);
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.values).get(key).cloned()
    }

    fn check_available(&self) -> StateResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StateStoreError::Unavailable("memory backend offline".to_string()))
        }
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(lock(&self.values).get(key).cloned())
    }

    async fn cas_put(&self, key: &str, expected: Option<&[u8]>, next: &[u8]) -> StateResult<bool> {
        self.check_available()?;
        let mut values = lock(&self.values);
        if values.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        values.insert(key.to_string(), next.to_vec());
        Ok(true)
    }
}

// =============================================================================
// PROMOTION PRIMITIVE
// =============================================================================

#[derive(Debug, Default)]
struct PromoterInner {
    calls: Vec<(RegionId, Uuid)>,
    script: VecDeque<Result<(), PrimitiveError>>,
    primaries: HashSet<RegionId>,
}

/// Promotion primitive that succeeds unless scripted otherwise.
///
/// A successful promotion makes the region report primary and writable,
/// unless confirmation is disabled.
#[derive(Debug)]
pub struct MemoryPromoter {
    inner: Mutex<PromoterInner>,
    hanging: AtomicBool,
    confirms: AtomicBool,
    delay_ms: AtomicU32,
}

impl Default for MemoryPromoter {
    fn default() -> Self {
        Self {
            inner: Mutex::new(PromoterInner::default()),
            hanging: AtomicBool::new(false),
            confirms: AtomicBool::new(true),
            delay_ms: AtomicU32::new(0),
        }
    }
}

impl MemoryPromoter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next call. Unscripted calls succeed.
    pub fn push_result(&self, result: Result<(), PrimitiveError>) {
        lock(&self.inner).script.push_back(result);
    }

    /// Calls never return.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Whether a promoted region reports the primary role.
    pub fn set_confirms(&self, confirms: bool) {
        self.confirms.store(confirms, Ordering::SeqCst);
    }

    /// Latency of each promotion call.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Every call made, in order.
    pub fn calls(&self) -> Vec<(RegionId, Uuid)> {
        lock(&self.inner).calls.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.inner).calls.len()
    }
}

#[async_trait]
impl PromotionPrimitive for MemoryPromoter {
    async fn promote_to_primary(&self, region: &RegionId, token: Uuid) -> Result<(), PrimitiveError> {
        let scripted = {
            let mut inner = lock(&self.inner);
            inner.calls.push((region.clone(), token));
            inner.script.pop_front()
        };

        if self.hanging.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(delay))).await;
        }

        let result = scripted.unwrap_or(Ok(()));
        if result.is_ok() {
            lock(&self.inner).primaries.insert(region.clone());
        }
        result
    }

    async fn target_status(&self, region: &RegionId) -> Result<TargetStatus, PrimitiveError> {
        let promoted = lock(&self.inner).primaries.contains(region);
        let confirmed = promoted && self.confirms.load(Ordering::SeqCst);
        Ok(TargetStatus {
            is_primary: confirmed,
            accepting_writes: confirmed,
        })
    }
}

// =============================================================================
// ROUTING CONTROL
// =============================================================================

#[derive(Debug, Default)]
struct RoutingInner {
    observed: HashMap<(String, RegionId), u8>,
    history: Vec<RoutingChange>,
    stalled: HashSet<(String, RegionId, u8)>,
    write_error: Option<RoutingError>,
}

/// Routing plane with instant propagation, except for stalled weights.
#[derive(Debug, Default)]
pub struct MemoryRouting {
    inner: Mutex<RoutingInner>,
}

impl MemoryRouting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes of `weight` for `region` on `record` never become visible.
    pub fn stall(&self, record: &str, region: &RegionId, weight: u8) {
        lock(&self.inner)
            .stalled
            .insert((record.to_string(), region.clone(), weight));
    }

    /// Remove every stall.
    pub fn unstall_all(&self) {
        lock(&self.inner).stalled.clear();
    }

    /// Every write fails with `error` until cleared.
    pub fn fail_writes(&self, error: RoutingError) {
        lock(&self.inner).write_error = Some(error);
    }

    pub fn clear_write_failure(&self) {
        lock(&self.inner).write_error = None;
    }

    /// Seed the served weight without recording a write.
    pub fn set_observed(&self, record: &str, region: &RegionId, weight: u8) {
        lock(&self.inner)
            .observed
            .insert((record.to_string(), region.clone()), weight);
    }

    pub fn observed(&self, record: &str, region: &RegionId) -> Option<u8> {
        lock(&self.inner)
            .observed
            .get(&(record.to_string(), region.clone()))
            .copied()
    }

    /// All writes attempted, in order.
    pub fn history(&self) -> Vec<RoutingChange> {
        lock(&self.inner).history.clone()
    }

    /// Weights written for one region, in order.
    pub fn weights_written(&self, region: &RegionId) -> Vec<u8> {
        lock(&self.inner)
            .history
            .iter()
            .filter(|c| &c.region == region)
            .map(|c| c.weight)
            .collect()
    }
}

#[async_trait]
impl RoutingControl for MemoryRouting {
    async fn set_weight(&self, record: &str, region: &RegionId, weight: u8) -> Result<(), RoutingError> {
        let mut inner = lock(&self.inner);
        inner.history.push(RoutingChange {
            record: record.to_string(),
            region: region.clone(),
            weight,
        });
        if let Some(err) = inner.write_error.clone() {
            return Err(err);
        }
        if !inner
            .stalled
            .contains(&(record.to_string(), region.clone(), weight))
        {
            inner
                .observed
                .insert((record.to_string(), region.clone()), weight);
        }
        Ok(())
    }

    async fn observed_weight(&self, record: &str, region: &RegionId) -> Result<Option<u8>, RoutingError> {
        Ok(self.observed(record, region))
    }
}

// =============================================================================
// PUBLISHER
// =============================================================================

/// Collects delivered envelopes.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    delivered: Mutex<Vec<NotificationEnvelope>>,
    failures_left: AtomicU32,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` publish calls fail.
    pub fn fail_times(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn envelopes(&self) -> Vec<NotificationEnvelope> {
        lock(&self.delivered).clone()
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        lock(&self.delivered).iter().map(|e| e.name).collect()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, _topic: &str, envelope: &NotificationEnvelope) -> Result<(), PublishError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PublishError("topic unavailable".to_string()));
        }
        lock(&self.delivered).push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_cas_semantics() {
        let backend = MemoryStateBackend::new();
        assert!(backend.cas_put("k", None, b"a").await.unwrap());
        assert!(!backend.cas_put("k", None, b"b").await.unwrap());
        assert!(!backend.cas_put("k", Some(b"x"), b"b").await.unwrap());
        assert!(backend.cas_put("k", Some(b"a"), b"b").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_unreachable() {
        let probe = MemoryProbe::new();
        let report = probe.probe(&Endpoint::new("nowhere:1")).await.unwrap();
        assert!(!report.reachable);
    }

    #[tokio::test]
    async fn test_promoter_confirms_after_success_only() {
        let promoter = MemoryPromoter::new();
        let region = RegionId::new("us-west-2");
        promoter.push_result(Err(PrimitiveError::fatal("denied")));

        assert!(promoter.promote_to_primary(&region, Uuid::new_v4()).await.is_err());
        assert!(!promoter.target_status(&region).await.unwrap().is_confirmed());

        promoter.promote_to_primary(&region, Uuid::new_v4()).await.unwrap();
        assert!(promoter.target_status(&region).await.unwrap().is_confirmed());
        assert_eq!(promoter.call_count(), 2);
    }

    #[tokio::test]
    async fn test_routing_stall_hides_weight() {
        let routing = MemoryRouting::new();
        let region = RegionId::new("us-west-2");
        routing.stall("r", &region, 50);

        routing.set_weight("r", &region, 25).await.unwrap();
        routing.set_weight("r", &region, 50).await.unwrap();
        assert_eq!(routing.observed_weight("r", &region).await.unwrap(), Some(25));
        assert_eq!(routing.weights_written(&region), vec![25, 50]);
    }

    #[tokio::test]
    async fn test_publisher_failure_budget() {
        let publisher = MemoryPublisher::new();
        publisher.fail_times(1);
        let envelope = NotificationEnvelope::new(
            "t",
            crate::notify::FailoverEvent::OperatorResolved {
                primary: RegionId::new("a"),
                operation_id: None,
            },
        );
        assert!(publisher.publish("t", &envelope).await.is_err());
        assert!(publisher.publish("t", &envelope).await.is_ok());
        assert_eq!(publisher.envelopes().len(), 1);
    }
}
