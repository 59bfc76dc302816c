//! Promotion primitive
//!
//! The region-level operation that makes a standby writable, plus the
//! read side used to confirm the role change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::region::RegionId;

/// Role report of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetStatus {
    pub is_primary: bool,
    pub accepting_writes: bool,
}

impl TargetStatus {
    /// Primary role and serving writes.
    pub fn is_confirmed(&self) -> bool {
        self.is_primary && self.accepting_writes
    }
}

/// Failure reported by the primitive, classified by the adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PrimitiveError {
    pub retryable: bool,
    pub message: String,
}

impl PrimitiveError {
    /// Throttling, timeouts and other transient faults.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    /// Invalid state, not found, permission denied.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

/// Cloud or database API that promotes a standby.
///
/// `token` is the failover operation id. Implementations should pass it
/// along as an idempotency key where the provider supports one.
#[async_trait]
pub trait PromotionPrimitive: Send + Sync {
    async fn promote_to_primary(&self, region: &RegionId, token: Uuid) -> Result<(), PrimitiveError>;

    async fn target_status(&self, region: &RegionId) -> Result<TargetStatus, PrimitiveError>;
}
