//! Promotion Coordinator
//!
//! Only the process that wins the step-1 CAS may call the primitive, so
//! concurrent orchestrators reach the external API at most once per
//! operation. Steps run strictly in sequence and are not cancellable once
//! step 1 has committed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::errors::{PromotionError, PromotionErrorKind, PromotionResult};
use super::primitive::{PrimitiveError, PromotionPrimitive};
use crate::notify::{FailoverEvent, NotificationSink};
use crate::observability::{Event, MetricsRegistry};
use crate::region::RegionId;
use crate::retry::RetryPolicy;
use crate::state::{FailoverState, FailoverStateStore};

/// Bounds of a promotion.
#[derive(Debug, Clone)]
pub struct PromotionSettings {
    /// Retries of `promote_to_primary`
    pub retry: RetryPolicy,
    /// Bound on each primitive call
    pub call_timeout: Duration,
    /// Total wait for the target to confirm its role
    pub confirm_timeout: Duration,
    /// Delay between role checks
    pub confirm_interval: Duration,
    /// Retries of state commits after step 1
    pub commit_retry: RetryPolicy,
}

impl Default for PromotionSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::exponential(),
            call_timeout: Duration::from_secs(30),
            confirm_timeout: Duration::from_secs(600),
            confirm_interval: Duration::from_secs(5),
            commit_retry: RetryPolicy::exponential()
                .initial_backoff(Duration::from_millis(200))
                .max_backoff(Duration::from_secs(5)),
        }
    }
}

/// A committed promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionOutcome {
    pub operation_id: Uuid,
    /// Record as committed in phase `Promoted`
    pub state: FailoverState,
    /// Primitive calls made
    pub attempts: u32,
}

pub struct PromotionCoordinator {
    store: FailoverStateStore,
    primitive: Arc<dyn PromotionPrimitive>,
    sink: NotificationSink,
    metrics: Arc<MetricsRegistry>,
    settings: PromotionSettings,
}

impl PromotionCoordinator {
    pub fn new(
        store: FailoverStateStore,
        primitive: Arc<dyn PromotionPrimitive>,
        sink: NotificationSink,
        metrics: Arc<MetricsRegistry>,
        settings: PromotionSettings,
    ) -> Self {
        Self {
            store,
            primitive,
            sink,
            metrics,
            settings,
        }
    }

    pub fn settings(&self) -> &PromotionSettings {
        &self.settings
    }

    /// Promote `target`, starting from the record the caller last read.
    pub async fn promote(
        &self,
        target: &RegionId,
        expected: &FailoverState,
    ) -> PromotionResult<PromotionOutcome> {
        let operation_id = Uuid::new_v4();
        let owned = self.acquire(target, expected, operation_id).await?;

        self.metrics.increment_failovers_started();
        info!(
            event = Event::FailoverBegin.as_str(),
            operation_id = %operation_id,
            from = %expected.current_primary_id,
            target = %target,
        );
        self.sink.publish(FailoverEvent::FailoverStarted {
            operation_id,
            from: expected.current_primary_id.clone(),
            target: target.clone(),
        });

        let attempts = match self.invoke(target, operation_id).await {
            Ok(attempts) => attempts,
            Err(err) => return Err(self.fail(&owned, err).await),
        };

        if let Err(err) = self.confirm(target).await {
            return Err(self.fail(&owned, err).await);
        }

        let promoted = owned
            .clone()
            .mark_promoted(Utc::now())
            .map_err(PromotionError::invalid_state)?;
        if let Err(err) = self.commit(&owned, &promoted).await {
            return Err(self.unrecorded(operation_id, target, err));
        }

        self.metrics.increment_promotions_confirmed();
        info!(
            event = Event::PromotionConfirmed.as_str(),
            operation_id = %operation_id,
            primary = %target,
            attempts,
        );
        self.sink.publish(FailoverEvent::PromotionConfirmed {
            operation_id,
            primary: target.clone(),
            attempts,
        });

        Ok(PromotionOutcome {
            operation_id,
            state: promoted,
            attempts,
        })
    }

    /// Step 1: claim the record.
    async fn acquire(
        &self,
        target: &RegionId,
        expected: &FailoverState,
        operation_id: Uuid,
    ) -> PromotionResult<FailoverState> {
        let next = expected
            .clone()
            .begin_failover(target.clone(), operation_id, Utc::now())
            .map_err(PromotionError::invalid_state)?;

        match self.store.compare_and_swap(expected, &next).await {
            Ok(true) => Ok(next),
            Ok(false) => Err(self.conflict(operation_id)),
            Err(err) => {
                // the write may have landed; only the stored id can tell
                match self.store.try_read().await {
                    Ok(Some(current)) if current.is_owned_by(operation_id) => Ok(current),
                    Ok(Some(current)) if current == *expected => Err(PromotionError::state_store(err)),
                    Ok(Some(_)) => Err(self.conflict(operation_id)),
                    _ => Err(PromotionError::state_store(err)),
                }
            }
        }
    }

    fn conflict(&self, operation_id: Uuid) -> PromotionError {
        self.metrics.increment_cas_conflicts();
        info!(
            event = Event::FailoverConflict.as_str(),
            operation_id = %operation_id,
            "another operation changed the failover record first"
        );
        PromotionError::conflict("failover record changed by another operation")
    }

    /// Step 2: call the primitive. Returns the attempt count.
    async fn invoke(&self, target: &RegionId, operation_id: Uuid) -> PromotionResult<u32> {
        let primitive = self.primitive.as_ref();
        let metrics = self.metrics.as_ref();
        let call_timeout = self.settings.call_timeout;

        let result = self
            .settings
            .retry
            .run(
                move |attempt| async move {
                    metrics.increment_promotion_attempts();
                    debug!(
                        event = Event::PromotionAttempt.as_str(),
                        operation_id = %operation_id,
                        target = %target,
                        attempt,
                    );
                    tokio::time::timeout(call_timeout, primitive.promote_to_primary(target, operation_id))
                        .await
                        .unwrap_or_else(|_| {
                            Err(PrimitiveError::retryable(format!(
                                "promotion call timed out after {:?}",
                                call_timeout
                            )))
                        })
                },
                |e: &PrimitiveError| e.retryable,
            )
            .await;

        match result {
            Ok(done) => Ok(done.attempts),
            Err(failure) if failure.exhausted => Err(PromotionError::retries_exhausted(
                failure.attempts,
                failure.last_error,
            )),
            Err(failure) => Err(PromotionError::rejected(failure.last_error.message)),
        }
    }

    /// Step 3: wait until the target reports primary and writable.
    async fn confirm(&self, target: &RegionId) -> PromotionResult<()> {
        let poll = async {
            loop {
                match tokio::time::timeout(
                    self.settings.call_timeout,
                    self.primitive.target_status(target),
                )
                .await
                {
                    Ok(Ok(status)) if status.is_confirmed() => return Ok(()),
                    Ok(Ok(status)) => debug!(
                        target = %target,
                        is_primary = status.is_primary,
                        accepting_writes = status.accepting_writes,
                        "waiting for promotion to take effect"
                    ),
                    Ok(Err(e)) if !e.retryable => return Err(PromotionError::rejected(e.message)),
                    Ok(Err(e)) => debug!(target = %target, error = %e, "role check failed"),
                    Err(_) => debug!(target = %target, "role check timed out"),
                }
                tokio::time::sleep(self.settings.confirm_interval).await;
            }
        };

        tokio::time::timeout(self.settings.confirm_timeout, poll)
            .await
            .unwrap_or_else(|_| Err(PromotionError::timeout(self.settings.confirm_timeout)))
    }

    /// Step 4 and failure commits.
    async fn commit(&self, owned: &FailoverState, next: &FailoverState) -> PromotionResult<()> {
        match self
            .store
            .advance(owned, next, &self.settings.commit_retry)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(PromotionError::new(
                PromotionErrorKind::StateStore,
                false,
                format!(
                    "failover record no longer owned by operation {:?}",
                    owned.operation_id
                ),
            )),
            Err(err) => Err(PromotionError::state_store(err)),
        }
    }

    /// The target serves writes but the record still says FailoverInProgress.
    /// Nothing is rolled back; the alarm asks an operator to reconcile.
    fn unrecorded(&self, operation_id: Uuid, target: &RegionId, cause: PromotionError) -> PromotionError {
        self.metrics.increment_promotions_failed();
        error!(
            event = Event::PromotionUnrecorded.as_str(),
            operation_id = %operation_id,
            primary = %target,
            kind = cause.kind.as_str(),
            error = %cause.message,
        );
        self.sink.publish(FailoverEvent::PromotionUnrecorded {
            operation_id,
            primary: target.clone(),
            reason: cause.message.clone(),
        });
        cause
    }

    /// Record `FailoverFailed` and raise the alarm. Returns the cause.
    async fn fail(&self, owned: &FailoverState, cause: PromotionError) -> PromotionError {
        self.metrics.increment_promotions_failed();
        let operation_id = owned.operation_id.unwrap_or_else(Uuid::nil);
        let target = owned
            .target_region
            .clone()
            .unwrap_or_else(|| owned.current_primary_id.clone());

        error!(
            event = Event::PromotionFailed.as_str(),
            operation_id = %operation_id,
            target = %target,
            kind = cause.kind.as_str(),
            error = %cause.message,
        );

        match owned.clone().mark_failed(cause.message.clone(), Utc::now()) {
            Ok(failed) => {
                if let Err(commit_err) = self.commit(owned, &failed).await {
                    warn!(
                        operation_id = %operation_id,
                        error = %commit_err,
                        "could not record FailoverFailed; record left in FailoverInProgress"
                    );
                }
            }
            Err(e) => warn!(operation_id = %operation_id, error = %e, "cannot mark operation failed"),
        }

        self.sink.publish(FailoverEvent::PromotionFailed {
            operation_id,
            target,
            reason: cause.message.clone(),
        });
        cause
    }
}
