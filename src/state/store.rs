//! Failover State Store
//!
//! The only mutable shared resource of the orchestrator. Every write is a
//! compare-and-swap against the full prior record; there is no blind put.
//! Linearizability per key is the backend's responsibility.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::errors::{StateResult, StateStoreError};
use super::phase::FailoverState;
use crate::observability::Event;
use crate::region::RegionId;
use crate::retry::RetryPolicy;

/// Default key of the failover record.
pub const DEFAULT_STATE_KEY: &str = "failover/state";

/// Default bound on a single backend call.
pub const DEFAULT_STATE_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable, strongly consistent key-value record.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Current value under `key`, if any.
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>>;

    /// Write `next` only if the stored value equals `expected`
    /// (`None` = key absent). Returns whether the write happened.
    async fn cas_put(&self, key: &str, expected: Option<&[u8]>, next: &[u8]) -> StateResult<bool>;
}

/// Typed access to the failover record.
#[derive(Clone)]
pub struct FailoverStateStore {
    backend: Arc<dyn StateBackend>,
    key: String,
    op_timeout: Duration,
}

impl FailoverStateStore {
    /// Create a store over a backend.
    pub fn new(backend: Arc<dyn StateBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            op_timeout: DEFAULT_STATE_OP_TIMEOUT,
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the record, if one exists.
    pub async fn try_read(&self) -> StateResult<Option<FailoverState>> {
        let raw = tokio::time::timeout(self.op_timeout, self.backend.get(&self.key))
            .await
            .map_err(|_| StateStoreError::Timeout(self.op_timeout))??;

        raw.map(|bytes| decode(&bytes)).transpose()
    }

    /// Read the record. Fails with `NotInitialized` when absent.
    pub async fn read(&self) -> StateResult<FailoverState> {
        self.try_read()
            .await?
            .ok_or_else(|| StateStoreError::NotInitialized(self.key.clone()))
    }

    /// Replace `expected` with `next`. Returns `false` when another writer
    /// changed the record first.
    pub async fn compare_and_swap(
        &self,
        expected: &FailoverState,
        next: &FailoverState,
    ) -> StateResult<bool> {
        let expected_bytes = encode(expected)?;
        let next_bytes = encode(next)?;

        let swapped = tokio::time::timeout(
            self.op_timeout,
            self.backend
                .cas_put(&self.key, Some(&expected_bytes), &next_bytes),
        )
        .await
        .map_err(|_| StateStoreError::Timeout(self.op_timeout))??;

        debug!(
            event = Event::StateCas.as_str(),
            key = %self.key,
            from = expected.phase.as_str(),
            to = next.phase.as_str(),
            swapped,
        );
        Ok(swapped)
    }

    /// Commit a transition of a record the caller owns.
    ///
    /// Retryable backend errors are retried under `retry`. A swap that
    /// reports `false` is re-read: if the stored record already equals
    /// `next`, an earlier ambiguous attempt landed and the commit counts.
    pub async fn advance(
        &self,
        expected: &FailoverState,
        next: &FailoverState,
        retry: &RetryPolicy,
    ) -> StateResult<bool> {
        let outcome = retry
            .run(
                |_| async move {
                    if self.compare_and_swap(expected, next).await? {
                        return Ok(true);
                    }
                    Ok::<_, StateStoreError>(self.try_read().await?.as_ref() == Some(next))
                },
                StateStoreError::is_retryable,
            )
            .await;

        match outcome {
            Ok(done) => Ok(done.value),
            Err(failure) => {
                warn!(
                    event = Event::StateUnavailable.as_str(),
                    key = %self.key,
                    attempts = failure.attempts,
                    error = %failure.last_error,
                );
                Err(failure.last_error)
            }
        }
    }

    /// Create the record with `primary` in `Idle` unless one already
    /// exists. Returns whatever record is stored afterwards.
    pub async fn initialize(&self, primary: RegionId) -> StateResult<FailoverState> {
        let initial = FailoverState::bootstrap(primary);
        let bytes = encode(&initial)?;

        let created = tokio::time::timeout(
            self.op_timeout,
            self.backend.cas_put(&self.key, None, &bytes),
        )
        .await
        .map_err(|_| StateStoreError::Timeout(self.op_timeout))??;

        if created {
            info!(
                event = Event::StateInitialized.as_str(),
                key = %self.key,
                primary = %initial.current_primary_id,
            );
            return Ok(initial);
        }

        self.read().await
    }
}

fn encode(state: &FailoverState) -> StateResult<Vec<u8>> {
    serde_json::to_vec(state).map_err(|e| StateStoreError::Corrupt(e.to_string()))
}

fn decode(bytes: &[u8]) -> StateResult<FailoverState> {
    serde_json::from_slice(bytes).map_err(|e| StateStoreError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStateBackend;
    use crate::state::FailoverPhase;
    use chrono::Utc;
    use uuid::Uuid;

    fn store() -> (Arc<MemoryStateBackend>, FailoverStateStore) {
        let backend = Arc::new(MemoryStateBackend::new());
        let store = FailoverStateStore::new(backend.clone(), DEFAULT_STATE_KEY);
        (backend, store)
    }

    #[tokio::test]
    async fn test_read_before_initialize_fails() {
        let (_, store) = store();
        assert!(store.try_read().await.unwrap().is_none());
        assert!(matches!(
            store.read().await,
            Err(StateStoreError::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_is_create_once() {
        let (_, store) = store();
        let first = store.initialize(RegionId::new("us-east-1")).await.unwrap();
        assert_eq!(first.phase, FailoverPhase::Idle);

        // a second deployment bootstrap does not overwrite the record
        let second = store.initialize(RegionId::new("us-west-2")).await.unwrap();
        assert_eq!(second.current_primary_id, RegionId::new("us-east-1"));
    }

    #[tokio::test]
    async fn test_cas_succeeds_from_expected() {
        let (_, store) = store();
        let current = store.initialize(RegionId::new("us-east-1")).await.unwrap();
        let next = current
            .clone()
            .begin_failover(RegionId::new("us-west-2"), Uuid::new_v4(), Utc::now())
            .unwrap();

        assert!(store.compare_and_swap(&current, &next).await.unwrap());
        assert_eq!(store.read().await.unwrap(), next);
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_expected() {
        let (_, store) = store();
        let current = store.initialize(RegionId::new("us-east-1")).await.unwrap();
        let first = current
            .clone()
            .begin_failover(RegionId::new("us-west-2"), Uuid::new_v4(), Utc::now())
            .unwrap();
        let second = current
            .clone()
            .begin_failover(RegionId::new("eu-west-1"), Uuid::new_v4(), Utc::now())
            .unwrap();

        assert!(store.compare_and_swap(&current, &first).await.unwrap());
        assert!(!store.compare_and_swap(&current, &second).await.unwrap());
        assert_eq!(store.read().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_backend_outage_surfaces_as_retryable() {
        let (backend, store) = store();
        let current = store.initialize(RegionId::new("us-east-1")).await.unwrap();
        backend.set_available(false);

        let err = store.read().await.unwrap_err();
        assert!(err.is_retryable());
        let err = store.compare_and_swap(&current, &current).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_advance_commits_owned_transition() {
        let (_, store) = store();
        let current = store.initialize(RegionId::new("us-east-1")).await.unwrap();
        let next = current
            .clone()
            .begin_failover(RegionId::new("us-west-2"), Uuid::new_v4(), Utc::now())
            .unwrap();
        let retry = RetryPolicy::fixed(std::time::Duration::from_millis(1));

        assert!(store.advance(&current, &next, &retry).await.unwrap());
        // replaying the same commit is recognised as already applied
        assert!(store.advance(&current, &next, &retry).await.unwrap());
    }

    #[tokio::test]
    async fn test_advance_reports_foreign_change() {
        let (_, store) = store();
        let current = store.initialize(RegionId::new("us-east-1")).await.unwrap();
        let theirs = current
            .clone()
            .begin_failover(RegionId::new("eu-west-1"), Uuid::new_v4(), Utc::now())
            .unwrap();
        let ours = current
            .clone()
            .begin_failover(RegionId::new("us-west-2"), Uuid::new_v4(), Utc::now())
            .unwrap();
        let retry = RetryPolicy::fixed(std::time::Duration::from_millis(1));

        assert!(store.compare_and_swap(&current, &theirs).await.unwrap());
        assert!(!store.advance(&current, &ours, &retry).await.unwrap());
    }

    #[tokio::test]
    async fn test_advance_gives_up_on_outage() {
        let (backend, store) = store();
        let current = store.initialize(RegionId::new("us-east-1")).await.unwrap();
        backend.set_available(false);
        let retry = RetryPolicy::fixed(std::time::Duration::from_millis(1)).max_attempts(3);

        let err = store.advance(&current, &current, &retry).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let (backend, store) = store();
        backend.insert_raw(DEFAULT_STATE_KEY, b"not json".to_vec());
        let err = store.read().await.unwrap_err();
        assert!(matches!(err, StateStoreError::Corrupt(_)));
        assert!(!err.is_retryable());
    }
}
