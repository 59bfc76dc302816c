//! Top-level orchestrator error
//!
//! Component errors keep their own types; this enum only joins them at
//! the control loop and CLI boundary.

use thiserror::Error;

use crate::config::ConfigError;
use crate::cutover::{CutoverError, CutoverErrorKind};
use crate::promotion::PromotionError;
use crate::state::{StateStoreError, TransitionError};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateStoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error(transparent)]
    Cutover(#[from] CutoverError),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl OrchestratorError {
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Whether the next cycle may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::State(e) => e.is_retryable(),
            Self::Promotion(e) => e.retryable,
            Self::Cutover(e) => e.kind == CutoverErrorKind::StateStore,
            Self::Config(_) | Self::Transition(_) | Self::InvalidOperation(_) => false,
        }
    }

    /// Errors that stop the control loop: the record is missing or
    /// unreadable, so no cycle can make a safe decision.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::State(StateStoreError::Corrupt(_))
                | Self::State(StateStoreError::NotInitialized(_))
        )
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
