//! failoverd - cross-region failover and traffic-cutover orchestrator
//!
//! A control loop that watches a primary region and its standbys, decides
//! when the primary is down, promotes exactly one standby and shifts
//! traffic to it step by step.
//!
//! Pipeline, one cycle at a time:
//! - `health`: probe every region, keep bounded sample history
//! - `policy`: pure decision over history and the committed record
//! - `promotion`: CAS-guarded, at-most-once promotion of the target
//! - `cutover`: monotonic, verified routing weight shift
//! - `state`: the single durable record everything above coordinates on
//! - `notify`: fire-and-forget operator notifications
//!
//! External systems sit behind traits; `adapters` holds the in-memory,
//! file, TCP and command-hook implementations.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod cutover;
pub mod error;
pub mod health;
pub mod notify;
pub mod observability;
pub mod orchestrator;
pub mod policy;
pub mod promotion;
pub mod region;
pub mod retry;
pub mod state;

pub use config::{ConfigError, OrchestratorConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{resolve_failure, Adapters, CycleOutcome, Orchestrator};
pub use region::{Endpoint, RegionId, RegionSpec};
