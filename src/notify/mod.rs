//! Failover notifications
//!
//! Operators observe phase transitions and terminal failures through
//! this channel. Delivery is at-least-once and never gates the
//! orchestration pipeline.

mod events;
mod sink;

pub use events::{FailoverEvent, NotificationEnvelope};
pub use sink::{NotificationConfig, NotificationSink, PublishError, Publisher, DEFAULT_TOPIC};
