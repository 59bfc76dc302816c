//! Notification Sink
//!
//! `publish` never blocks and never fails: events go onto an unbounded
//! channel and a background worker delivers them with bounded retries.
//! A delivery failure is logged and counted, nothing more.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::events::{FailoverEvent, NotificationEnvelope};
use crate::observability::{Event, MetricsRegistry};
use crate::retry::RetryPolicy;

/// Default topic name.
pub const DEFAULT_TOPIC: &str = "failover-events";

/// Default bound on one publish attempt.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// External pub/sub endpoint.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, envelope: &NotificationEnvelope) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

/// Delivery settings of the background worker.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub topic: String,
    pub retry: RetryPolicy,
    /// A hung publish counts as a failed attempt once this elapses
    pub publish_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            retry: RetryPolicy::exponential().max_attempts(3),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

/// Fire-and-forget handle to the notification channel.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<FailoverEvent>,
}

impl NotificationSink {
    /// Wrap an existing channel. The receiver side decides delivery.
    pub fn new(tx: mpsc::UnboundedSender<FailoverEvent>) -> Self {
        Self { tx }
    }

    /// Start a delivery worker and return the sink feeding it.
    ///
    /// The worker exits once every sink clone is dropped and the queue
    /// has drained.
    pub fn spawn(
        publisher: Arc<dyn Publisher>,
        config: NotificationConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(deliver(rx, publisher, config, metrics));
        (Self::new(tx), handle)
    }

    /// Queue an event. Never blocks.
    pub fn publish(&self, event: FailoverEvent) {
        let name = event.event_name();
        if self.tx.send(event).is_err() {
            warn!(
                event = Event::NotificationDropped.as_str(),
                name,
                "notification worker is gone"
            );
        }
    }
}

async fn deliver(
    mut rx: mpsc::UnboundedReceiver<FailoverEvent>,
    publisher: Arc<dyn Publisher>,
    config: NotificationConfig,
    metrics: Arc<MetricsRegistry>,
) {
    let publisher = publisher.as_ref();
    let topic = config.topic.as_str();
    let publish_timeout = config.publish_timeout;

    while let Some(event) = rx.recv().await {
        let envelope = NotificationEnvelope::new(topic, event);
        let envelope = &envelope;

        let result = config
            .retry
            .run(
                move |_| async move {
                    tokio::time::timeout(publish_timeout, publisher.publish(topic, envelope))
                        .await
                        .unwrap_or_else(|_| {
                            Err(PublishError(format!(
                                "publish timed out after {:?}",
                                publish_timeout
                            )))
                        })
                },
                |_| true,
            )
            .await;

        match result {
            Ok(done) => {
                metrics.increment_notifications_published();
                debug!(
                    event = Event::NotificationDelivered.as_str(),
                    name = envelope.name,
                    attempts = done.attempts,
                );
            }
            Err(failure) => {
                metrics.increment_notifications_dropped();
                warn!(
                    event = Event::NotificationDropped.as_str(),
                    name = envelope.name,
                    attempts = failure.attempts,
                    error = %failure.last_error,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryPublisher;
    use crate::region::RegionId;
    use std::time::Duration;

    fn resolved() -> FailoverEvent {
        FailoverEvent::OperatorResolved {
            primary: RegionId::new("us-east-1"),
            operation_id: None,
        }
    }

    fn quick() -> NotificationConfig {
        NotificationConfig {
            topic: "failover-events".to_string(),
            retry: RetryPolicy::fixed(Duration::from_millis(1)).max_attempts(3),
            publish_timeout: Duration::from_millis(20),
        }
    }

    /// Accepts the call and never answers.
    struct SilentPublisher;

    #[async_trait]
    impl Publisher for SilentPublisher {
        async fn publish(&self, _topic: &str, _envelope: &NotificationEnvelope) -> Result<(), PublishError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_publish_is_queued() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = NotificationSink::new(tx);
        sink.publish(resolved());
        assert_eq!(rx.try_recv().unwrap(), resolved());
    }

    #[test]
    fn test_publish_to_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        NotificationSink::new(tx).publish(resolved());
    }

    #[tokio::test]
    async fn test_worker_delivers_in_order() {
        let publisher = Arc::new(MemoryPublisher::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let (sink, handle) = NotificationSink::spawn(publisher.clone(), quick(), metrics.clone());

        sink.publish(resolved());
        sink.publish(FailoverEvent::PolicyAborted {
            reason: crate::policy::AbortReason::UnknownPrimary {
                primary: RegionId::new("mars-1"),
            },
        });
        drop(sink);
        handle.await.unwrap();

        assert_eq!(
            publisher.event_names(),
            vec!["failover.operator.resolved", "failover.policy.aborted"]
        );
        assert_eq!(metrics.snapshot().notifications_published, 2);
    }

    #[tokio::test]
    async fn test_worker_retries_transient_failures() {
        let publisher = Arc::new(MemoryPublisher::new());
        publisher.fail_times(2);
        let metrics = Arc::new(MetricsRegistry::new());
        let (sink, handle) = NotificationSink::spawn(publisher.clone(), quick(), metrics.clone());

        sink.publish(resolved());
        drop(sink);
        handle.await.unwrap();

        assert_eq!(publisher.envelopes().len(), 1);
        assert_eq!(metrics.snapshot().notifications_dropped, 0);
    }

    #[tokio::test]
    async fn test_worker_drops_after_bound_and_continues() {
        let publisher = Arc::new(MemoryPublisher::new());
        publisher.fail_times(3);
        let metrics = Arc::new(MetricsRegistry::new());
        let (sink, handle) = NotificationSink::spawn(publisher.clone(), quick(), metrics.clone());

        sink.publish(resolved());
        sink.publish(resolved());
        drop(sink);
        handle.await.unwrap();

        // first event exhausted its three attempts, second went through
        assert_eq!(publisher.envelopes().len(), 1);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.notifications_dropped, 1);
        assert_eq!(snapshot.notifications_published, 1);
    }

    #[tokio::test]
    async fn test_hung_publisher_does_not_stall_worker() {
        let metrics = Arc::new(MetricsRegistry::new());
        let (sink, handle) = NotificationSink::spawn(Arc::new(SilentPublisher), quick(), metrics.clone());

        sink.publish(resolved());
        sink.publish(resolved());
        drop(sink);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker finished")
            .unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.notifications_dropped, 2);
        assert_eq!(snapshot.notifications_published, 0);
    }
}
