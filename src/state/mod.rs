//! Failover state
//!
//! A single CAS-guarded record holds which region is primary, the
//! in-flight operation id, and the phase of the latest failover. It is
//! created once per deployment and never deleted.

mod errors;
mod phase;
mod store;

pub use errors::{StateResult, StateStoreError, TransitionError};
pub use phase::{FailoverPhase, FailoverState};
pub use store::{FailoverStateStore, StateBackend, DEFAULT_STATE_KEY, DEFAULT_STATE_OP_TIMEOUT};
