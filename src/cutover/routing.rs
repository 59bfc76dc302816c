//! Routing control plane (weighted DNS or global load balancer).

use async_trait::async_trait;
use thiserror::Error;

use crate::region::RegionId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RoutingError {
    pub retryable: bool,
    pub message: String,
}

impl RoutingError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait RoutingControl: Send + Sync {
    /// Request `weight` for `region` on `record`. Propagation is eventual.
    async fn set_weight(&self, record: &str, region: &RegionId, weight: u8) -> Result<(), RoutingError>;

    /// Weight currently served for `region`, if the record carries one.
    async fn observed_weight(&self, record: &str, region: &RegionId) -> Result<Option<u8>, RoutingError>;
}
