//! Traffic cutover
//!
//! Monotonic, verified, step-wise shift of routing weight to a promoted
//! region. Cutover never rolls back.

mod errors;
mod manager;
mod plan;
mod routing;

pub use errors::{CutoverError, CutoverErrorKind, CutoverResult};
pub use manager::{CutoverOutcome, CutoverSettings, TrafficCutoverManager};
pub use plan::{
    validate_weights, CutoverPlan, CutoverStep, RoutingChange, DEFAULT_WEIGHT_STEPS, FULL_WEIGHT,
};
pub use routing::{RoutingControl, RoutingError};
