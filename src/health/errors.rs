//! Health collection errors
//!
//! Collection errors are per region and never fatal to the control loop.

use std::time::Duration;

use thiserror::Error;

use crate::region::RegionId;

/// Failure reported by a probe adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The probe backend itself could not be reached or errored
    #[error("probe backend unavailable: {0}")]
    Unavailable(String),

    /// The probe backend answered with something unparseable
    #[error("invalid probe response: {0}")]
    InvalidResponse(String),
}

/// Why collection failed for one region.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectionCause {
    /// The probe did not return within its bound
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Collection failure for a single region.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("health collection failed for region {region}: {cause}")]
pub struct CollectionError {
    pub region: RegionId,
    pub cause: CollectionCause,
}

impl CollectionError {
    pub fn new(region: RegionId, cause: impl Into<CollectionCause>) -> Self {
        Self {
            region,
            cause: cause.into(),
        }
    }

    /// Whether the probe hung rather than failing outright.
    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, CollectionCause::Timeout(_))
    }
}
