//! Failover notification events
//!
//! Describes what happened; never decides what happens. Every phase
//! change of the failover record and every alarm produces one event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::policy::{AbortReason, WarningReason};
use crate::region::RegionId;

/// Event published to the notification topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailoverEvent {
    /// failover.operation.started
    /// The operation won the CAS; the record is FailoverInProgress.
    FailoverStarted {
        operation_id: Uuid,
        from: RegionId,
        target: RegionId,
    },

    /// failover.promotion.confirmed
    /// The target serves writes; the record is Promoted.
    PromotionConfirmed {
        operation_id: Uuid,
        primary: RegionId,
        attempts: u32,
    },

    /// failover.promotion.failed
    /// The record is FailoverFailed. Manual remediation required.
    PromotionFailed {
        operation_id: Uuid,
        target: RegionId,
        reason: String,
    },

    /// failover.promotion.unrecorded
    /// The target confirmed as primary but the Promoted commit failed; the
    /// record is stuck in FailoverInProgress. Manual remediation required.
    PromotionUnrecorded {
        operation_id: Uuid,
        primary: RegionId,
        reason: String,
    },

    /// failover.cutover.step_verified
    CutoverStepVerified {
        operation_id: Option<Uuid>,
        record: String,
        target: RegionId,
        weight: u8,
    },

    /// failover.cutover.degraded
    /// Cutover stopped part way; the record stays Promoted.
    CutoverDegraded {
        operation_id: Option<Uuid>,
        target: RegionId,
        last_verified_weight: Option<u8>,
        reason: String,
    },

    /// failover.operation.completed
    /// The record is FailedOver.
    FailoverCompleted {
        operation_id: Option<Uuid>,
        primary: RegionId,
        previous_primary: Option<RegionId>,
    },

    /// failover.policy.warning
    PolicyWarning { reason: WarningReason },

    /// failover.policy.aborted
    PolicyAborted { reason: AbortReason },

    /// failover.operator.resolved
    /// An operator moved a FailoverFailed record back to Idle.
    OperatorResolved {
        primary: RegionId,
        operation_id: Option<Uuid>,
    },
}

impl FailoverEvent {
    /// Get the event name for routing and filtering.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::FailoverStarted { .. } => "failover.operation.started",
            Self::PromotionConfirmed { .. } => "failover.promotion.confirmed",
            Self::PromotionFailed { .. } => "failover.promotion.failed",
            Self::PromotionUnrecorded { .. } => "failover.promotion.unrecorded",
            Self::CutoverStepVerified { .. } => "failover.cutover.step_verified",
            Self::CutoverDegraded { .. } => "failover.cutover.degraded",
            Self::FailoverCompleted { .. } => "failover.operation.completed",
            Self::PolicyWarning { .. } => "failover.policy.warning",
            Self::PolicyAborted { .. } => "failover.policy.aborted",
            Self::OperatorResolved { .. } => "failover.operator.resolved",
        }
    }

    /// Alarms need a human.
    pub fn is_alarm(&self) -> bool {
        matches!(
            self,
            Self::PromotionFailed { .. }
                | Self::PromotionUnrecorded { .. }
                | Self::CutoverDegraded { .. }
                | Self::PolicyAborted { .. }
        )
    }
}

/// Wire form of a published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEnvelope {
    pub topic: String,
    pub name: &'static str,
    pub alarm: bool,
    pub emitted_at: DateTime<Utc>,
    pub event: FailoverEvent,
}

impl NotificationEnvelope {
    pub fn new(topic: impl Into<String>, event: FailoverEvent) -> Self {
        Self {
            topic: topic.into(),
            name: event.event_name(),
            alarm: event.is_alarm(),
            emitted_at: Utc::now(),
            event,
        }
    }

    /// JSON body handed to the publisher.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
