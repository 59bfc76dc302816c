//! Failover Policy Evaluator
//!
//! Pure and deterministic: identical histories and state always produce
//! the identical decision. No I/O, no clock reads.
//!
//! A region is down only after `down_after_consecutive` unreachable
//! samples in a row. A standby is eligible only when its newest sample is
//! reachable with a known replication lag strictly below the threshold.
//! Among eligible standbys the lowest lag wins, then the lowest region id.
//!
//! The phase check here is advisory; the state-store CAS in the promotion
//! coordinator is what actually prevents concurrent operations.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::decision::{AbortReason, Decision, HealthStatus, WarningReason};
use crate::health::HealthHistory;
use crate::region::RegionId;
use crate::state::{FailoverPhase, FailoverState};

/// Default K.
pub const DEFAULT_DOWN_AFTER_CONSECUTIVE: u32 = 3;

/// Default staleness threshold for standby eligibility.
pub const DEFAULT_MAX_REPLICATION_LAG: Duration = Duration::from_secs(30);

/// Thresholds driving the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Consecutive unreachable samples before a region counts as down
    pub down_after_consecutive: u32,
    /// Standbys at or above this lag are not promoted
    pub max_replication_lag: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            down_after_consecutive: DEFAULT_DOWN_AFTER_CONSECUTIVE,
            max_replication_lag: DEFAULT_MAX_REPLICATION_LAG,
        }
    }
}

/// Stateless decision function over region histories.
#[derive(Debug, Clone, Default)]
pub struct FailoverPolicyEvaluator {
    config: PolicyConfig,
}

impl FailoverPolicyEvaluator {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Decide what the control loop should do.
    pub fn evaluate(
        &self,
        histories: &BTreeMap<RegionId, HealthHistory>,
        state: &FailoverState,
    ) -> Decision {
        let primary = &state.current_primary_id;
        let Some(primary_history) = histories.get(primary) else {
            return Decision::Abort(AbortReason::UnknownPrimary {
                primary: primary.clone(),
            });
        };

        let primary_down = self.is_down(primary_history);

        match state.phase {
            // the control loop never evaluates while it runs an operation, so
            // an in-progress record here belongs to someone else or is stranded
            FailoverPhase::FailoverInProgress => {
                return Decision::RaiseWarning(WarningReason::OperationInProgress {
                    operation_id: state.operation_id,
                    target: state.target_region.clone(),
                })
            }
            FailoverPhase::Promoted => {
                return Decision::RaiseWarning(WarningReason::CutoverIncomplete {
                    primary: primary.clone(),
                })
            }
            FailoverPhase::FailoverFailed if primary_down => {
                return Decision::Abort(AbortReason::ManualInterventionRequired {
                    primary: primary.clone(),
                })
            }
            _ => {}
        }

        if primary_history.is_empty() {
            return Decision::RaiseWarning(WarningReason::PrimaryUnobserved {
                primary: primary.clone(),
            });
        }

        if primary_down {
            // FailoverFailed returned above, so the phase permits a new operation
            return match self.select_target(histories, primary) {
                Some(target) => Decision::BeginFailover { target },
                None => Decision::RaiseWarning(WarningReason::NoEligibleStandby {
                    primary: primary.clone(),
                }),
            };
        }

        // below the threshold a failing primary is not actionable; `assess`
        // still reports it as degraded
        if self.select_target(histories, primary).is_none() {
            if let Some((region, lag)) = self.closest_standby(histories, primary) {
                return Decision::RaiseWarning(WarningReason::StandbyNotReady {
                    region,
                    replication_lag: lag,
                });
            }
        }

        Decision::NoAction
    }

    /// Classify the topology for status reporting.
    pub fn assess(
        &self,
        histories: &BTreeMap<RegionId, HealthHistory>,
        state: &FailoverState,
    ) -> HealthStatus {
        if state.phase.is_operation_in_flight() {
            return HealthStatus::FailoverInProgress;
        }
        match self.evaluate(histories, state) {
            Decision::BeginFailover { .. } => HealthStatus::FailoverRequired,
            Decision::RaiseWarning(_) | Decision::Abort(_) => HealthStatus::DegradedWarn,
            Decision::NoAction if self.is_degraded(histories, state) => HealthStatus::DegradedWarn,
            Decision::NoAction if state.phase == FailoverPhase::FailedOver => {
                HealthStatus::FailedOver
            }
            Decision::NoAction => HealthStatus::Healthy,
        }
    }

    /// Primary has failed its latest samples, fewer than the down threshold.
    pub fn is_degraded(
        &self,
        histories: &BTreeMap<RegionId, HealthHistory>,
        state: &FailoverState,
    ) -> bool {
        histories
            .get(&state.current_primary_id)
            .map(|h| h.consecutive_failures() > 0)
            .unwrap_or(false)
    }

    /// Whether the region's newest samples meet the down threshold.
    pub fn is_down(&self, history: &HealthHistory) -> bool {
        history.consecutive_failures() >= self.threshold()
    }

    fn threshold(&self) -> u32 {
        self.config.down_after_consecutive.max(1)
    }

    fn select_target(
        &self,
        histories: &BTreeMap<RegionId, HealthHistory>,
        primary: &RegionId,
    ) -> Option<RegionId> {
        histories
            .iter()
            .filter(|(id, _)| *id != primary)
            .filter_map(|(id, history)| {
                let latest = history.latest()?;
                let lag = latest.replication_lag?;
                (latest.reachable && lag < self.config.max_replication_lag).then_some((lag, id))
            })
            .min()
            .map(|(_, id)| id.clone())
    }

    /// Best non-eligible standby, for the warning payload.
    fn closest_standby(
        &self,
        histories: &BTreeMap<RegionId, HealthHistory>,
        primary: &RegionId,
    ) -> Option<(RegionId, Option<Duration>)> {
        histories
            .iter()
            .filter(|(id, _)| *id != primary)
            .map(|(id, history)| {
                let lag = history
                    .latest()
                    .filter(|s| s.reachable)
                    .and_then(|s| s.replication_lag);
                // known lags sort before unknown ones
                (lag.is_none(), lag, id)
            })
            .min()
            .map(|(_, lag, id)| (id.clone(), lag))
    }
}
