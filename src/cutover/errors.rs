//! Cutover Error Types
//!
//! A cutover failure never rolls traffic back and never moves the record
//! out of `Promoted`: the target already holds write authority.

use std::fmt;

use crate::state::StateStoreError;

/// Cutover error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoverError {
    pub kind: CutoverErrorKind,
    /// Plan step that failed, when one did
    pub step: Option<usize>,
    pub message: String,
}

/// Cutover error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoverErrorKind {
    /// A step's weight never became visible within its attempt bound
    PropagationTimeout,

    /// The routing plane rejected a weight write
    RoutingUpdate,

    /// Weight schedule or record list is unusable
    InvalidPlan,

    /// The record is not `Promoted` for this target
    InvalidState,

    /// The final commit could not be written
    StateStore,
}

impl CutoverErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PropagationTimeout => "propagation_timeout",
            Self::RoutingUpdate => "routing_update",
            Self::InvalidPlan => "invalid_plan",
            Self::InvalidState => "invalid_state",
            Self::StateStore => "state_store",
        }
    }
}

impl CutoverError {
    pub fn new(kind: CutoverErrorKind, step: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            kind,
            step,
            message: message.into(),
        }
    }

    pub fn propagation_timeout(step: usize, weight: u8, attempts: u32) -> Self {
        Self::new(
            CutoverErrorKind::PropagationTimeout,
            Some(step),
            format!(
                "weight {} not observed after {} attempts at step {}",
                weight, attempts, step
            ),
        )
    }

    pub fn routing_update(step: usize, message: impl Into<String>) -> Self {
        Self::new(CutoverErrorKind::RoutingUpdate, Some(step), message)
    }

    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::new(CutoverErrorKind::InvalidPlan, None, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(CutoverErrorKind::InvalidState, None, message)
    }

    pub fn state_store(err: StateStoreError) -> Self {
        Self::new(CutoverErrorKind::StateStore, None, err.to_string())
    }
}

impl fmt::Display for CutoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CutoverError({}): {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for CutoverError {}

pub type CutoverResult<T> = Result<T, CutoverError>;
