//! Health signal collection
//!
//! Read-only against external systems. The only state owned here is the
//! bounded per-region sample history consumed by the policy evaluator.

mod collector;
mod errors;
mod snapshot;

pub use collector::{CollectionReport, HealthProbe, HealthSignalCollector};
pub use errors::{CollectionCause, CollectionError, ProbeError};
pub use snapshot::{HealthHistory, HealthSnapshot, ProbeReport, DEFAULT_HISTORY_CAPACITY};
