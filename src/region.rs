//! Region identity and endpoint descriptors
//!
//! Regions are externally owned infrastructure. The orchestrator never
//! creates or deletes them; it only probes their endpoints and moves the
//! primary role between them. Which region is primary is not stored here:
//! it is derived from the committed `FailoverState`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a region (e.g. `us-east-1`).
///
/// Ordering is lexical and is used as the final deterministic tie-break
/// when several standbys qualify for promotion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// Create a region id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty ids are rejected by config validation.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RegionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Role of a region relative to the committed failover state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionRole {
    /// Sole write-serving region.
    Primary,
    /// Replica eligible for promotion.
    Standby,
}

impl RegionRole {
    /// Role name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Standby => "standby",
        }
    }
}

/// Connection descriptor handed to the health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Database or load-balancer address (`host:port`).
    pub address: String,

    /// External health-check identifier, if the probe backend uses one.
    #[serde(default)]
    pub health_check_id: Option<String>,
}

impl Endpoint {
    /// Create an endpoint with no health-check id.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            health_check_id: None,
        }
    }

    /// Attach a health-check id.
    pub fn with_health_check(mut self, id: impl Into<String>) -> Self {
        self.health_check_id = Some(id.into());
        self
    }
}

/// A monitored region as configured by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    /// Region id
    pub id: RegionId,
    /// Endpoint probed every cycle
    pub endpoint: Endpoint,
}

impl RegionSpec {
    /// Create a region spec.
    pub fn new(id: impl Into<RegionId>, endpoint: Endpoint) -> Self {
        Self {
            id: id.into(),
            endpoint,
        }
    }

    /// Role of this region given the committed primary.
    pub fn role(&self, current_primary: &RegionId) -> RegionRole {
        if &self.id == current_primary {
            RegionRole::Primary
        } else {
            RegionRole::Standby
        }
    }
}
