//! Traffic Cutover Manager
//!
//! Shifts routing weight to a promoted region one step at a time. A step
//! is complete only once the routing plane serves the new weights. A step
//! that does not propagate is re-applied on its own up to a bound; past
//! that the cutover stops, leaving the record `Promoted`.
//!
//! The target's weight never decreases, including across a resumed
//! cutover: steps below the currently served weight are skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::errors::{CutoverError, CutoverResult};
use super::plan::{CutoverPlan, CutoverStep, RoutingChange, DEFAULT_WEIGHT_STEPS};
use super::routing::{RoutingControl, RoutingError};
use crate::notify::{FailoverEvent, NotificationSink};
use crate::observability::{Event, MetricsRegistry};
use crate::region::RegionId;
use crate::retry::RetryPolicy;
use crate::state::{FailoverPhase, FailoverState, FailoverStateStore};

/// Bounds of a cutover.
#[derive(Debug, Clone)]
pub struct CutoverSettings {
    /// Routing records to shift
    pub records: Vec<String>,
    /// Target weights, strictly increasing, ending at 100
    pub weight_steps: Vec<u8>,
    /// Wait for one step's weights to become visible
    pub step_timeout: Duration,
    /// Delay between reads of observed weights
    pub verify_interval: Duration,
    /// Applications of a single step before giving up
    pub max_step_attempts: u32,
    /// Bound on each routing call
    pub call_timeout: Duration,
    /// Retries of the final state commit
    pub commit_retry: RetryPolicy,
}

impl Default for CutoverSettings {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            weight_steps: DEFAULT_WEIGHT_STEPS.to_vec(),
            step_timeout: Duration::from_secs(60),
            verify_interval: Duration::from_secs(2),
            max_step_attempts: 3,
            call_timeout: Duration::from_secs(30),
            commit_retry: RetryPolicy::exponential()
                .initial_backoff(Duration::from_millis(200))
                .max_backoff(Duration::from_secs(5)),
        }
    }
}

/// A completed cutover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoverOutcome {
    /// Record as committed in phase `FailedOver`
    pub state: FailoverState,
    /// Steps applied by this call
    pub steps_applied: usize,
}

pub struct TrafficCutoverManager {
    store: FailoverStateStore,
    routing: Arc<dyn RoutingControl>,
    sink: NotificationSink,
    metrics: Arc<MetricsRegistry>,
    settings: CutoverSettings,
}

impl TrafficCutoverManager {
    pub fn new(
        store: FailoverStateStore,
        routing: Arc<dyn RoutingControl>,
        sink: NotificationSink,
        metrics: Arc<MetricsRegistry>,
        settings: CutoverSettings,
    ) -> Self {
        Self {
            store,
            routing,
            sink,
            metrics,
            settings,
        }
    }

    pub fn settings(&self) -> &CutoverSettings {
        &self.settings
    }

    /// Shift traffic to `target` and commit `FailedOver`.
    pub async fn cutover(
        &self,
        target: &RegionId,
        promoted: &FailoverState,
    ) -> CutoverResult<CutoverOutcome> {
        if promoted.phase != FailoverPhase::Promoted || &promoted.current_primary_id != target {
            return Err(CutoverError::invalid_state(format!(
                "cutover to {} requires a Promoted record for it, found {} with primary {}",
                target, promoted.phase, promoted.current_primary_id
            )));
        }

        let plan = CutoverPlan::new(
            target.clone(),
            promoted.previous_primary_id.clone(),
            self.settings.records.clone(),
            &self.settings.weight_steps,
        )?;
        let operation_id = promoted.operation_id;

        let served = self.served_weight(&plan).await;
        let remaining = plan.remaining(served);
        if remaining.len() < plan.steps().len() {
            info!(
                target = %target,
                served,
                skipped = plan.steps().len() - remaining.len(),
                "resuming cutover"
            );
        }

        let mut last_verified = None;
        for step in remaining {
            if let Err(err) = self.run_step(&plan, step, operation_id).await {
                return Err(self.degrade(target, operation_id, last_verified, err));
            }
            last_verified = Some(step.target_weight);
        }

        info!(
            event = Event::CutoverComplete.as_str(),
            operation_id = ?operation_id,
            target = %target,
            records = plan.records().len(),
        );

        let done = promoted
            .clone()
            .mark_failed_over(Utc::now())
            .map_err(|e| CutoverError::invalid_state(e.to_string()))?;

        let committed = self
            .store
            .advance(promoted, &done, &self.settings.commit_retry)
            .await;
        match committed {
            Ok(true) => {}
            Ok(false) => {
                let err = CutoverError::invalid_state("failover record changed during cutover");
                return Err(self.degrade(target, operation_id, last_verified, err));
            }
            Err(e) => {
                let err = CutoverError::state_store(e);
                return Err(self.degrade(target, operation_id, last_verified, err));
            }
        }

        self.metrics.increment_cutovers_completed();
        info!(
            event = Event::FailoverComplete.as_str(),
            operation_id = ?operation_id,
            primary = %target,
            steps = remaining.len(),
        );
        self.sink.publish(FailoverEvent::FailoverCompleted {
            operation_id,
            primary: target.clone(),
            previous_primary: promoted.previous_primary_id.clone(),
        });

        Ok(CutoverOutcome {
            state: done,
            steps_applied: remaining.len(),
        })
    }

    async fn run_step(
        &self,
        plan: &CutoverPlan,
        step: &CutoverStep,
        operation_id: Option<Uuid>,
    ) -> CutoverResult<()> {
        let changes = plan.changes(step);
        let max = self.settings.max_step_attempts.max(1);

        for attempt in 1..=max {
            if attempt > 1 {
                self.metrics.increment_cutover_step_retries();
            }

            match self.apply(&changes).await {
                Ok(()) => {}
                Err(e) if !e.retryable => {
                    return Err(CutoverError::routing_update(step.number, e.message));
                }
                Err(e) => {
                    warn!(step = step.number, attempt, error = %e, "routing update failed");
                    continue;
                }
            }

            self.metrics.increment_cutover_steps();
            info!(
                event = Event::CutoverStepApplied.as_str(),
                step = step.number,
                target = %plan.target(),
                weight = step.target_weight,
                attempt,
            );

            if self.verify(&changes).await {
                info!(
                    event = Event::CutoverStepVerified.as_str(),
                    step = step.number,
                    target = %plan.target(),
                    weight = step.target_weight,
                );
                for record in plan.records() {
                    self.sink.publish(FailoverEvent::CutoverStepVerified {
                        operation_id,
                        record: record.clone(),
                        target: plan.target().clone(),
                        weight: step.target_weight,
                    });
                }
                return Ok(());
            }

            warn!(
                step = step.number,
                weight = step.target_weight,
                attempt,
                max,
                "weights not observed within step timeout"
            );
        }

        Err(CutoverError::propagation_timeout(
            step.number,
            step.target_weight,
            max,
        ))
    }

    async fn apply(&self, changes: &[RoutingChange]) -> Result<(), RoutingError> {
        let timeout = self.settings.call_timeout;
        for change in changes {
            tokio::time::timeout(
                timeout,
                self.routing
                    .set_weight(&change.record, &change.region, change.weight),
            )
            .await
            .unwrap_or_else(|_| {
                Err(RoutingError::retryable(format!(
                    "set_weight timed out after {:?}",
                    timeout
                )))
            })?;
        }
        Ok(())
    }

    /// Poll until every change is served, or the step timeout passes.
    async fn verify(&self, changes: &[RoutingChange]) -> bool {
        let poll = async {
            loop {
                if self.all_observed(changes).await {
                    return;
                }
                tokio::time::sleep(self.settings.verify_interval).await;
            }
        };
        tokio::time::timeout(self.settings.step_timeout, poll)
            .await
            .is_ok()
    }

    async fn all_observed(&self, changes: &[RoutingChange]) -> bool {
        for change in changes {
            let observed = tokio::time::timeout(
                self.settings.call_timeout,
                self.routing.observed_weight(&change.record, &change.region),
            )
            .await;
            match observed {
                Ok(Ok(Some(weight))) if weight == change.weight => {}
                Ok(Ok(other)) => {
                    debug!(
                        record = %change.record,
                        region = %change.region,
                        expected = change.weight,
                        observed = ?other,
                        "weight not yet propagated"
                    );
                    return false;
                }
                Ok(Err(e)) => {
                    debug!(record = %change.record, error = %e, "weight read failed");
                    return false;
                }
                Err(_) => return false,
            }
        }
        true
    }

    /// Highest weight the target already serves on any record.
    async fn served_weight(&self, plan: &CutoverPlan) -> u8 {
        let mut served = 0;
        for record in plan.records() {
            let observed = tokio::time::timeout(
                self.settings.call_timeout,
                self.routing.observed_weight(record, plan.target()),
            )
            .await;
            if let Ok(Ok(Some(weight))) = observed {
                served = served.max(weight);
            }
        }
        served
    }

    fn degrade(
        &self,
        target: &RegionId,
        operation_id: Option<Uuid>,
        last_verified_weight: Option<u8>,
        err: CutoverError,
    ) -> CutoverError {
        self.metrics.increment_cutovers_degraded();
        error!(
            event = Event::CutoverDegraded.as_str(),
            operation_id = ?operation_id,
            target = %target,
            kind = err.kind.as_str(),
            last_verified_weight = ?last_verified_weight,
            error = %err.message,
        );
        self.sink.publish(FailoverEvent::CutoverDegraded {
            operation_id,
            target: target.clone(),
            last_verified_weight,
            reason: err.message.clone(),
        });
        err
    }
}
