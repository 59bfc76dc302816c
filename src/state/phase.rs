//! Failover State Machine
//!
//! Phases are explicit and enumerable; every transition is a consuming
//! method that either yields the next state or names the forbidden edge.
//!
//! ```text
//! Idle -> FailoverInProgress -> Promoted -> FailedOver
//!                            \-> FailoverFailed
//! FailedOver -> FailoverInProgress          (next operation)
//! FailoverFailed -> Idle                    (operator only)
//! ```
//!
//! `FailedOver` and `FailoverFailed` are terminal for their operation id.
//! `FailoverFailed` is never left automatically.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::TransitionError;
use crate::region::RegionId;

/// Phase of the failover record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPhase {
    /// No operation has run, or the last failed one was remediated.
    Idle,
    /// An operation won the CAS and is promoting the target.
    FailoverInProgress,
    /// The target is primary; traffic is not yet fully shifted.
    Promoted,
    /// Promotion and cutover both completed.
    FailedOver,
    /// The operation stopped in an unknown topology. Manual remediation.
    FailoverFailed,
}

impl FailoverPhase {
    /// Phase name for observability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::FailoverInProgress => "FailoverInProgress",
            Self::Promoted => "Promoted",
            Self::FailedOver => "FailedOver",
            Self::FailoverFailed => "FailoverFailed",
        }
    }

    /// A new operation may only start from these phases.
    pub fn can_begin_failover(&self) -> bool {
        matches!(self, Self::Idle | Self::FailedOver)
    }

    /// An operation id is held by a running (or degraded) operation.
    pub fn is_operation_in_flight(&self) -> bool {
        matches!(self, Self::FailoverInProgress | Self::Promoted)
    }

    /// Terminal for the operation id that reached it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FailedOver | Self::FailoverFailed)
    }
}

impl fmt::Display for FailoverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single durable failover record.
///
/// Mutated only through compare-and-swap on the whole value, so the
/// operation id doubles as the ownership token of a running failover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverState {
    /// Region currently holding write authority
    pub current_primary_id: RegionId,
    /// Id of the latest operation; kept after it ends for audit
    pub operation_id: Option<Uuid>,
    pub phase: FailoverPhase,
    /// Region being promoted by the latest operation
    #[serde(default)]
    pub target_region: Option<RegionId>,
    /// Primary before the latest promotion; receives the complement weight during cutover
    #[serde(default)]
    pub previous_primary_id: Option<RegionId>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl FailoverState {
    /// Initial record for a deployment.
    pub fn bootstrap(primary: RegionId) -> Self {
        Self {
            current_primary_id: primary,
            operation_id: None,
            phase: FailoverPhase::Idle,
            target_region: None,
            previous_primary_id: None,
            started_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Idle | FailedOver -> FailoverInProgress
    pub fn begin_failover(
        self,
        target: RegionId,
        operation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        if !self.phase.can_begin_failover() {
            return Err(TransitionError::forbidden(
                self.phase,
                FailoverPhase::FailoverInProgress,
            ));
        }
        if target == self.current_primary_id {
            return Err(TransitionError::TargetIsPrimary(target));
        }

        Ok(Self {
            operation_id: Some(operation_id),
            phase: FailoverPhase::FailoverInProgress,
            target_region: Some(target),
            started_at: Some(now),
            completed_at: None,
            failure_reason: None,
            ..self
        })
    }

    /// FailoverInProgress -> Promoted
    ///
    /// The target becomes the committed primary.
    pub fn mark_promoted(self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        match (self.phase, self.target_region.clone()) {
            (FailoverPhase::FailoverInProgress, Some(target)) => {
                let previous = self.current_primary_id.clone();
                Ok(Self {
                    current_primary_id: target,
                    previous_primary_id: Some(previous),
                    phase: FailoverPhase::Promoted,
                    completed_at: Some(now),
                    ..self
                })
            }
            _ => Err(TransitionError::forbidden(self.phase, FailoverPhase::Promoted)),
        }
    }

    /// Promoted -> FailedOver
    pub fn mark_failed_over(self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        match self.phase {
            FailoverPhase::Promoted => Ok(Self {
                phase: FailoverPhase::FailedOver,
                completed_at: Some(now),
                ..self
            }),
            _ => Err(TransitionError::forbidden(self.phase, FailoverPhase::FailedOver)),
        }
    }

    /// FailoverInProgress -> FailoverFailed
    pub fn mark_failed(
        self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        match self.phase {
            FailoverPhase::FailoverInProgress => Ok(Self {
                phase: FailoverPhase::FailoverFailed,
                completed_at: Some(now),
                failure_reason: Some(reason.into()),
                ..self
            }),
            _ => Err(TransitionError::forbidden(
                self.phase,
                FailoverPhase::FailoverFailed,
            )),
        }
    }

    /// FailoverFailed -> Idle
    ///
    /// Operator remediation only. The operator names the region that
    /// actually holds write authority after inspecting the topology.
    pub fn acknowledge_failure(self, actual_primary: RegionId) -> Result<Self, TransitionError> {
        match self.phase {
            FailoverPhase::FailoverFailed => Ok(Self {
                previous_primary_id: Some(self.current_primary_id.clone()),
                current_primary_id: actual_primary,
                phase: FailoverPhase::Idle,
                target_region: None,
                failure_reason: None,
                ..self
            }),
            _ => Err(TransitionError::forbidden(self.phase, FailoverPhase::Idle)),
        }
    }

    /// Whether this record belongs to the given operation.
    pub fn is_owned_by(&self, operation_id: Uuid) -> bool {
        self.operation_id == Some(operation_id)
    }
}
