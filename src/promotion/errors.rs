//! Promotion Error Types
//!
//! If the coordinator cannot prove the target is primary it fails
//! explicitly. It never guesses and never reverts the record to Idle.

use std::fmt;
use std::time::Duration;

use crate::state::{StateStoreError, TransitionError};

/// Promotion error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionError {
    /// Error kind
    pub kind: PromotionErrorKind,
    /// Whether the caller may retry the whole operation later
    pub retryable: bool,
    /// Error message
    pub message: String,
}

/// Promotion error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionErrorKind {
    /// Another operation changed the record first
    Conflict,

    /// Prior state does not permit a new operation
    InvalidState,

    /// The primitive refused the promotion
    Rejected,

    /// Retryable primitive errors persisted past the attempt bound
    RetriesExhausted,

    /// Target did not confirm the primary role in time
    Timeout,

    /// State backend failed; outcome of the last write unknown
    StateStore,
}

impl PromotionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::InvalidState => "invalid_state",
            Self::Rejected => "rejected",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Timeout => "timeout",
            Self::StateStore => "state_store",
        }
    }
}

impl PromotionError {
    /// Create a new promotion error.
    pub fn new(kind: PromotionErrorKind, retryable: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable,
            message: message.into(),
        }
    }

    /// Lost the step-1 CAS. Expected with several orchestrators; not an alarm.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(PromotionErrorKind::Conflict, false, message)
    }

    pub fn invalid_state(err: TransitionError) -> Self {
        Self::new(PromotionErrorKind::InvalidState, false, err.to_string())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(PromotionErrorKind::Rejected, false, message)
    }

    pub fn retries_exhausted(attempts: u32, last: impl fmt::Display) -> Self {
        Self::new(
            PromotionErrorKind::RetriesExhausted,
            false,
            format!("promotion failed after {} attempts: {}", attempts, last),
        )
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            PromotionErrorKind::Timeout,
            false,
            format!("target did not confirm primary role within {:?}", after),
        )
    }

    pub fn state_store(err: StateStoreError) -> Self {
        Self::new(PromotionErrorKind::StateStore, err.is_retryable(), err.to_string())
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == PromotionErrorKind::Conflict
    }
}

impl fmt::Display for PromotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PromotionError({}): {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for PromotionError {}

/// Result type for promotion operations
pub type PromotionResult<T> = Result<T, PromotionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FailoverPhase;

    #[test]
    fn test_terminal_kinds_are_not_retryable() {
        assert!(!PromotionError::rejected("no").retryable);
        assert!(!PromotionError::timeout(Duration::from_secs(600)).retryable);
        assert!(!PromotionError::retries_exhausted(5, "throttled").retryable);
    }

    #[test]
    fn test_state_store_inherits_retryability() {
        let transient = PromotionError::state_store(StateStoreError::Unavailable("down".into()));
        assert!(transient.retryable);
        let corrupt = PromotionError::state_store(StateStoreError::Corrupt("bad".into()));
        assert!(!corrupt.retryable);
    }

    #[test]
    fn test_display() {
        let err = PromotionError::invalid_state(TransitionError::forbidden(
            FailoverPhase::FailoverFailed,
            FailoverPhase::FailoverInProgress,
        ));
        let text = err.to_string();
        assert!(text.contains("invalid_state"));
        assert!(text.contains("FailoverFailed -> FailoverInProgress"));
    }
}
