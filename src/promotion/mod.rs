//! Promotion
//!
//! At-most-once promotion of a standby, guarded by the state-store CAS.
//!
//! 1. CAS `Idle | FailedOver -> FailoverInProgress` with a fresh operation id
//! 2. Invoke the primitive with bounded, classified retries
//! 3. Poll the target until it is primary and accepting writes
//! 4. CAS `FailoverInProgress -> Promoted`
//!
//! Any failure after step 1 ends in `FailoverFailed`, which only an
//! operator can clear.

mod coordinator;
mod errors;
mod primitive;

pub use coordinator::{PromotionCoordinator, PromotionOutcome, PromotionSettings};
pub use errors::{PromotionError, PromotionErrorKind, PromotionResult};
pub use primitive::{PrimitiveError, PromotionPrimitive, TargetStatus};
