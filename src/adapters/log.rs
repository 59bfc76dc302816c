//! Publisher that writes envelopes to the structured log.
//!
//! Used when no external topic is configured; log shippers forward the
//! lines. Alarms are logged at error level.

use async_trait::async_trait;
use tracing::{error, info};

use crate::notify::{NotificationEnvelope, PublishError, Publisher};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl LogPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, topic: &str, envelope: &NotificationEnvelope) -> Result<(), PublishError> {
        let body = envelope
            .to_json()
            .map_err(|e| PublishError(e.to_string()))?;
        if envelope.alarm {
            error!(target: "failoverd::notify", topic, name = envelope.name, %body);
        } else {
            info!(target: "failoverd::notify", topic, name = envelope.name, %body);
        }
        Ok(())
    }
}
