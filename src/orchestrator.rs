//! Control loop
//!
//! One cycle: collect health, read the committed record, evaluate policy,
//! then act. Acting is either reporting a warning or abort, or running a
//! full failover (promotion followed by cutover) to completion within the
//! cycle. Cycles never overlap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::cutover::{CutoverError, CutoverOutcome, RoutingControl, TrafficCutoverManager};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::health::{HealthProbe, HealthSignalCollector};
use crate::notify::{FailoverEvent, NotificationSink};
use crate::observability::{Event, MetricsRegistry};
use crate::policy::{AbortReason, Decision, FailoverPolicyEvaluator, WarningReason};
use crate::promotion::{
    PromotionCoordinator, PromotionError, PromotionErrorKind, PromotionPrimitive,
};
use crate::region::{RegionId, RegionSpec};
use crate::state::{FailoverPhase, FailoverState, FailoverStateStore, StateBackend};

/// External systems the orchestrator drives.
pub struct Adapters {
    pub probe: Arc<dyn HealthProbe>,
    pub state: Arc<dyn StateBackend>,
    pub promoter: Arc<dyn PromotionPrimitive>,
    pub routing: Arc<dyn RoutingControl>,
    pub sink: NotificationSink,
}

/// Result of one control cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Healthy, or an operation owned by another orchestrator is running
    Idle,
    Warned(WarningReason),
    Aborted(AbortReason),
    /// Another orchestrator won the step-1 CAS
    Conflict,
    FailedOver {
        operation_id: Uuid,
        primary: RegionId,
    },
    /// Promotion committed, cutover stopped part way
    Degraded {
        primary: RegionId,
        error: CutoverError,
    },
    /// Record is now FailoverFailed
    PromotionFailed(PromotionError),
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Warned(_) => "warned",
            Self::Aborted(_) => "aborted",
            Self::Conflict => "conflict",
            Self::FailedOver { .. } => "failed_over",
            Self::Degraded { .. } => "degraded",
            Self::PromotionFailed(_) => "promotion_failed",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Idle | Self::Conflict => json!({ "outcome": self.as_str() }),
            Self::Warned(reason) => json!({
                "outcome": self.as_str(),
                "reason": reason,
                "message": reason.to_string(),
            }),
            Self::Aborted(reason) => json!({
                "outcome": self.as_str(),
                "reason": reason,
                "message": reason.to_string(),
            }),
            Self::FailedOver {
                operation_id,
                primary,
            } => json!({
                "outcome": self.as_str(),
                "operation_id": operation_id,
                "primary": primary,
            }),
            Self::Degraded { primary, error } => json!({
                "outcome": self.as_str(),
                "primary": primary,
                "kind": error.kind.as_str(),
                "step": error.step,
                "message": error.message,
            }),
            Self::PromotionFailed(error) => json!({
                "outcome": self.as_str(),
                "kind": error.kind.as_str(),
                "message": error.message,
            }),
        }
    }
}

pub struct Orchestrator {
    collector: HealthSignalCollector,
    evaluator: FailoverPolicyEvaluator,
    store: FailoverStateStore,
    promotion: PromotionCoordinator,
    cutover: TrafficCutoverManager,
    sink: NotificationSink,
    metrics: Arc<MetricsRegistry>,
    poll_interval: Duration,
    state_backoff: Duration,
    cycle: u64,
    /// Last warning or abort notified; repeats are logged, not published
    last_reported: Option<Decision>,
}

impl Orchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        adapters: Adapters,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let store = Self::open_store(config, adapters.state);

        Self {
            collector: HealthSignalCollector::new(
                config.regions.clone(),
                adapters.probe,
                config.probe_timeout(),
                config.history_capacity,
            ),
            evaluator: FailoverPolicyEvaluator::new(config.policy_config()),
            promotion: PromotionCoordinator::new(
                store.clone(),
                adapters.promoter,
                adapters.sink.clone(),
                metrics.clone(),
                config.promotion_settings(),
            ),
            cutover: TrafficCutoverManager::new(
                store.clone(),
                adapters.routing,
                adapters.sink.clone(),
                metrics.clone(),
                config.cutover_settings(),
            ),
            store,
            sink: adapters.sink,
            metrics,
            poll_interval: config.poll_interval(),
            state_backoff: config.state_backoff(),
            cycle: 0,
            last_reported: None,
        }
    }

    /// State store as configured, over any backend.
    pub fn open_store(config: &OrchestratorConfig, backend: Arc<dyn StateBackend>) -> FailoverStateStore {
        FailoverStateStore::new(backend, config.state.key.clone())
            .with_timeout(config.state_op_timeout())
    }

    pub fn store(&self) -> &FailoverStateStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn collector(&self) -> &HealthSignalCollector {
        &self.collector
    }

    /// Run one collect, evaluate, act cycle.
    pub async fn run_cycle(&mut self) -> OrchestratorResult<CycleOutcome> {
        self.cycle += 1;
        let cycle = self.cycle;
        let started = Instant::now();
        self.metrics.increment_cycles();
        info!(event = Event::CycleStart.as_str(), cycle);

        let report = self.collector.poll().await;
        if !report.is_complete() {
            self.metrics.add_collection_errors(report.errors.len() as u64);
        }

        let state = match self.store.read().await {
            Ok(state) => state,
            Err(err) => {
                self.metrics.increment_state_store_errors();
                return Err(err.into());
            }
        };

        let decision = self.evaluator.evaluate(self.collector.histories(), &state);
        info!(
            event = Event::PolicyDecision.as_str(),
            cycle,
            decision = decision.as_str(),
            primary = %state.current_primary_id,
            phase = state.phase.as_str(),
        );

        if decision == Decision::NoAction && self.evaluator.is_degraded(self.collector.histories(), &state) {
            warn!(
                event = Event::PolicyWarning.as_str(),
                cycle,
                primary = %state.current_primary_id,
                "primary failing health checks, below the down threshold"
            );
        }

        let outcome = self.act(decision, &state).await?;

        info!(
            event = Event::CycleComplete.as_str(),
            cycle,
            outcome = outcome.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
        );
        Ok(outcome)
    }

    async fn act(
        &mut self,
        decision: Decision,
        state: &FailoverState,
    ) -> OrchestratorResult<CycleOutcome> {
        match decision {
            Decision::NoAction => {
                self.last_reported = None;
                Ok(CycleOutcome::Idle)
            }
            Decision::RaiseWarning(reason) => {
                self.metrics.increment_warnings();
                warn!(event = Event::PolicyWarning.as_str(), reason = %reason);
                if self.is_new_report(&Decision::RaiseWarning(reason.clone())) {
                    self.sink.publish(FailoverEvent::PolicyWarning {
                        reason: reason.clone(),
                    });
                }
                Ok(CycleOutcome::Warned(reason))
            }
            Decision::Abort(reason) => {
                self.metrics.increment_aborts();
                error!(event = Event::PolicyAbort.as_str(), reason = %reason);
                if self.is_new_report(&Decision::Abort(reason.clone())) {
                    self.sink.publish(FailoverEvent::PolicyAborted {
                        reason: reason.clone(),
                    });
                }
                Ok(CycleOutcome::Aborted(reason))
            }
            Decision::BeginFailover { target } => {
                self.last_reported = None;
                self.failover(target, state).await
            }
        }
    }

    fn is_new_report(&mut self, decision: &Decision) -> bool {
        if self.last_reported.as_ref() == Some(decision) {
            return false;
        }
        self.last_reported = Some(decision.clone());
        true
    }

    async fn failover(
        &self,
        target: RegionId,
        state: &FailoverState,
    ) -> OrchestratorResult<CycleOutcome> {
        let promoted = match self.promotion.promote(&target, state).await {
            Ok(outcome) => outcome,
            Err(err) => {
                return match err.kind {
                    PromotionErrorKind::Conflict => Ok(CycleOutcome::Conflict),
                    PromotionErrorKind::Rejected
                    | PromotionErrorKind::RetriesExhausted
                    | PromotionErrorKind::Timeout => Ok(CycleOutcome::PromotionFailed(err)),
                    PromotionErrorKind::InvalidState | PromotionErrorKind::StateStore => {
                        Err(err.into())
                    }
                };
            }
        };

        match self.cutover.cutover(&target, &promoted.state).await {
            Ok(_) => Ok(CycleOutcome::FailedOver {
                operation_id: promoted.operation_id,
                primary: target,
            }),
            Err(error) => Ok(CycleOutcome::Degraded {
                primary: target,
                error,
            }),
        }
    }

    /// Drive a `Promoted` record, left behind by a degraded cutover, to
    /// `FailedOver`.
    pub async fn resume_cutover(&self) -> OrchestratorResult<CutoverOutcome> {
        let state = self.store.read().await?;
        if state.phase != FailoverPhase::Promoted {
            return Err(OrchestratorError::invalid_operation(format!(
                "resume-cutover requires phase Promoted, record is {}",
                state.phase
            )));
        }
        let target = state.current_primary_id.clone();
        Ok(self.cutover.cutover(&target, &state).await?)
    }

    /// Run cycles every poll interval until `shutdown` turns true.
    ///
    /// A shutdown request is honored between cycles; a running failover
    /// is always finished first. Transient errors back off and retry.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> OrchestratorResult<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            event = Event::LoopStart.as_str(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            key = self.store.key(),
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }

            match self.run_cycle().await {
                Ok(_) => {}
                Err(err) if err.is_fatal() => {
                    error!(cycle = self.cycle, error = %err, "control loop stopped");
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        cycle = self.cycle,
                        error = %err,
                        retryable = err.is_retryable(),
                        backoff_ms = self.state_backoff.as_millis() as u64,
                        "cycle failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.state_backoff) => {}
                        _ = wait_for_shutdown(&mut shutdown) => break,
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        info!(event = Event::ShutdownStart.as_str(), cycles = self.cycle);
        Ok(())
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Operator remediation: move a `FailoverFailed` record back to `Idle`
/// with `actual_primary` as the primary.
pub async fn resolve_failure(
    store: &FailoverStateStore,
    regions: &[RegionSpec],
    actual_primary: RegionId,
    sink: &NotificationSink,
) -> OrchestratorResult<FailoverState> {
    if !regions.iter().any(|r| r.id == actual_primary) {
        return Err(OrchestratorError::invalid_operation(format!(
            "region '{}' is not configured",
            actual_primary
        )));
    }

    let current = store.read().await?;
    let operation_id = current.operation_id;
    let next = current.clone().acknowledge_failure(actual_primary.clone())?;

    if !store.compare_and_swap(&current, &next).await? {
        return Err(OrchestratorError::invalid_operation(
            "failover record changed concurrently; re-read and retry",
        ));
    }

    info!(
        event = Event::OperatorResolved.as_str(),
        primary = %actual_primary,
        operation_id = ?operation_id,
    );
    sink.publish(FailoverEvent::OperatorResolved {
        primary: actual_primary,
        operation_id,
    });
    Ok(next)
}
