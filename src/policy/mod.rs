//! Failover policy
//!
//! Deterministic, side-effect free decision making over health history.

mod decision;
mod evaluator;

pub use decision::{AbortReason, Decision, HealthStatus, WarningReason};
pub use evaluator::{
    FailoverPolicyEvaluator, PolicyConfig, DEFAULT_DOWN_AFTER_CONSECUTIVE,
    DEFAULT_MAX_REPLICATION_LAG,
};
