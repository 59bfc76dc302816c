//! State store and transition errors

use std::time::Duration;

use thiserror::Error;

use super::phase::FailoverPhase;
use crate::region::RegionId;

/// Forbidden state-machine edge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("forbidden transition: {from} -> {to}")]
    Forbidden {
        from: FailoverPhase,
        to: FailoverPhase,
    },

    #[error("region {0} is already the primary")]
    TargetIsPrimary(RegionId),
}

impl TransitionError {
    pub fn forbidden(from: FailoverPhase, to: FailoverPhase) -> Self {
        Self::Forbidden { from, to }
    }
}

/// Failure of the durable state backend.
///
/// A store error never implies the write happened or did not happen;
/// callers must re-read before assuming either.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateStoreError {
    /// Backend could not be reached
    #[error("state backend unavailable: {0}")]
    Unavailable(String),

    /// Backend call exceeded its bound
    #[error("state backend call timed out after {0:?}")]
    Timeout(Duration),

    /// Stored bytes could not be decoded
    #[error("state record corrupt: {0}")]
    Corrupt(String),

    /// No record exists under the key
    #[error("no failover state under key '{0}'")]
    NotInitialized(String),
}

impl StateStoreError {
    /// Transient errors: back off and retry the whole cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Result type for state store operations
pub type StateResult<T> = Result<T, StateStoreError>;
