//! Evaluator outputs
//!
//! Every non-trivial decision carries a typed reason so the orchestrator
//! can explain why it acted, warned, or refused to act.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::region::RegionId;

/// What the control loop should do this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Nothing to do.
    NoAction,
    /// Degraded but not actionable; alert operators.
    RaiseWarning(WarningReason),
    /// Promote `target` and shift traffic to it.
    BeginFailover { target: RegionId },
    /// Automation must not proceed; manual intervention required.
    Abort(AbortReason),
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAction => "no_action",
            Self::RaiseWarning(_) => "raise_warning",
            Self::BeginFailover { .. } => "begin_failover",
            Self::Abort(_) => "abort",
        }
    }

    /// Target of a `BeginFailover` decision.
    pub fn failover_target(&self) -> Option<&RegionId> {
        match self {
            Self::BeginFailover { target } => Some(target),
            _ => None,
        }
    }
}

/// Why the evaluator raised a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WarningReason {
    /// No sample has been recorded for the primary yet
    PrimaryUnobserved { primary: RegionId },
    /// Primary is down but no standby is reachable with fresh data
    NoEligibleStandby { primary: RegionId },
    /// Primary is healthy but no standby could take over if it failed
    StandbyNotReady {
        region: RegionId,
        replication_lag: Option<Duration>,
    },
    /// A promotion committed but traffic was not fully shifted
    CutoverIncomplete { primary: RegionId },
    /// The record is FailoverInProgress and this loop does not own it:
    /// another orchestrator is promoting, or an operation was stranded
    OperationInProgress {
        operation_id: Option<Uuid>,
        target: Option<RegionId>,
    },
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryUnobserved { primary } => {
                write!(f, "primary {} has no health samples yet", primary)
            }
            Self::NoEligibleStandby { primary } => write!(
                f,
                "primary {} is down and no standby is reachable within the lag threshold",
                primary
            ),
            Self::StandbyNotReady {
                region,
                replication_lag,
            } => match replication_lag {
                Some(lag) => write!(f, "best standby {} lags by {:?}", region, lag),
                None => write!(f, "best standby {} is unreachable or lag is unknown", region),
            },
            Self::CutoverIncomplete { primary } => write!(
                f,
                "primary {} is promoted but traffic cutover did not complete",
                primary
            ),
            Self::OperationInProgress {
                operation_id,
                target,
            } => write!(
                f,
                "failover {} to {} is in progress without an owner in this process",
                operation_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
                target.as_ref().map(RegionId::as_str).unwrap_or("-")
            ),
        }
    }
}

/// Why the evaluator refused to automate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// The last operation ended in `FailoverFailed` and the primary is down
    ManualInterventionRequired { primary: RegionId },
    /// The committed primary is not a monitored region
    UnknownPrimary { primary: RegionId },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManualInterventionRequired { primary } => write!(
                f,
                "primary {} is down after a failed failover; manual remediation required",
                primary
            ),
            Self::UnknownPrimary { primary } => {
                write!(f, "committed primary {} is not a monitored region", primary)
            }
        }
    }
}

/// Coarse classification of the whole topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    DegradedWarn,
    FailoverRequired,
    FailoverInProgress,
    FailedOver,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::DegradedWarn => "DegradedWarn",
            Self::FailoverRequired => "FailoverRequired",
            Self::FailoverInProgress => "FailoverInProgress",
            Self::FailedOver => "FailedOver",
        }
    }
}
