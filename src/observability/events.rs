//! Observable events of the orchestrator
//!
//! Every structured log line carries one of these names in its `event`
//! field, so log pipelines can match on a stable vocabulary.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Control loop started
    LoopStart,
    /// Shutdown requested
    ShutdownStart,

    // Control cycle
    /// Cycle begins
    CycleStart,
    /// Cycle finished with an outcome
    CycleComplete,

    // Health collection
    /// A probe result was recorded
    HealthSample,
    /// A probe failed or hung; no sample recorded
    CollectionFailed,

    // Policy
    /// Evaluator produced a decision
    PolicyDecision,
    /// Degraded but not actionable
    PolicyWarning,
    /// Automation refused
    PolicyAbort,

    // State store
    /// Record created
    StateInitialized,
    /// Compare-and-swap attempted
    StateCas,
    /// Backend unavailable or slow
    StateUnavailable,
    /// Operator remediation applied
    OperatorResolved,

    // Promotion
    /// Operation won the CAS
    FailoverBegin,
    /// Operation lost the CAS to another orchestrator
    FailoverConflict,
    /// Promotion primitive invoked
    PromotionAttempt,
    /// Target confirmed as primary
    PromotionConfirmed,
    /// Operation ended in FailoverFailed
    PromotionFailed,
    /// Target promoted but the Promoted commit failed
    PromotionUnrecorded,

    // Cutover
    /// Routing weights written
    CutoverStepApplied,
    /// Weight visible on the routing plane
    CutoverStepVerified,
    /// All traffic shifted
    CutoverComplete,
    /// Cutover stopped part way
    CutoverDegraded,
    /// Operation reached FailedOver
    FailoverComplete,

    // Notifications
    /// Event handed to the publisher
    NotificationDelivered,
    /// Event dropped after retries or on a closed channel
    NotificationDropped,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::LoopStart => "CONTROL_LOOP_START",
            Event::ShutdownStart => "SHUTDOWN_START",

            Event::CycleStart => "CYCLE_START",
            Event::CycleComplete => "CYCLE_COMPLETE",

            Event::HealthSample => "HEALTH_SAMPLE",
            Event::CollectionFailed => "HEALTH_COLLECTION_FAILED",

            Event::PolicyDecision => "POLICY_DECISION",
            Event::PolicyWarning => "POLICY_WARNING",
            Event::PolicyAbort => "POLICY_ABORT",

            Event::StateInitialized => "STATE_INITIALIZED",
            Event::StateCas => "STATE_CAS",
            Event::StateUnavailable => "STATE_UNAVAILABLE",
            Event::OperatorResolved => "OPERATOR_RESOLVED",

            Event::FailoverBegin => "FAILOVER_BEGIN",
            Event::FailoverConflict => "FAILOVER_CONFLICT",
            Event::PromotionAttempt => "PROMOTION_ATTEMPT",
            Event::PromotionConfirmed => "PROMOTION_CONFIRMED",
            Event::PromotionFailed => "PROMOTION_FAILED",
            Event::PromotionUnrecorded => "PROMOTION_UNRECORDED",

            Event::CutoverStepApplied => "CUTOVER_STEP_APPLIED",
            Event::CutoverStepVerified => "CUTOVER_STEP_VERIFIED",
            Event::CutoverComplete => "CUTOVER_COMPLETE",
            Event::CutoverDegraded => "CUTOVER_DEGRADED",
            Event::FailoverComplete => "FAILOVER_COMPLETE",

            Event::NotificationDelivered => "NOTIFICATION_DELIVERED",
            Event::NotificationDropped => "NOTIFICATION_DROPPED",
        }
    }

    /// Events that page a human.
    pub fn is_alarm(&self) -> bool {
        matches!(
            self,
            Event::PolicyAbort
                | Event::PromotionFailed
                | Event::PromotionUnrecorded
                | Event::CutoverDegraded
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::ConfigLoaded,
            Event::LoopStart,
            Event::ShutdownStart,
            Event::CycleStart,
            Event::CycleComplete,
            Event::HealthSample,
            Event::CollectionFailed,
            Event::PolicyDecision,
            Event::PolicyWarning,
            Event::PolicyAbort,
            Event::StateInitialized,
            Event::StateCas,
            Event::StateUnavailable,
            Event::OperatorResolved,
            Event::FailoverBegin,
            Event::FailoverConflict,
            Event::PromotionAttempt,
            Event::PromotionConfirmed,
            Event::PromotionFailed,
            Event::PromotionUnrecorded,
            Event::CutoverStepApplied,
            Event::CutoverStepVerified,
            Event::CutoverComplete,
            Event::CutoverDegraded,
            Event::FailoverComplete,
            Event::NotificationDelivered,
            Event::NotificationDropped,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_alarm_events() {
        assert!(Event::PromotionFailed.is_alarm());
        assert!(Event::PromotionUnrecorded.is_alarm());
        assert!(Event::CutoverDegraded.is_alarm());
        assert!(Event::PolicyAbort.is_alarm());
        assert!(!Event::CycleStart.is_alarm());
        assert!(!Event::PolicyWarning.is_alarm());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::FailoverBegin), "FAILOVER_BEGIN");
        assert_eq!(
            format!("{}", Event::CutoverStepVerified),
            "CUTOVER_STEP_VERIFIED"
        );
    }
}
