//! State record concurrency tests
//!
//! - Of concurrent swaps from the same expected record, exactly one wins
//! - Concurrent promotions reach the external primitive exactly once
//!
//! These run on a multi-threaded runtime so the racing tasks really do
//! interleave.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use failoverd::adapters::{FileStateBackend, MemoryPromoter, MemoryStateBackend};
use failoverd::notify::NotificationSink;
use failoverd::observability::MetricsRegistry;
use failoverd::promotion::{PromotionCoordinator, PromotionErrorKind, PromotionSettings};
use failoverd::retry::RetryPolicy;
use failoverd::state::{FailoverPhase, FailoverStateStore, StateBackend, DEFAULT_STATE_KEY};
use failoverd::RegionId;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

const RACERS: usize = 8;

async fn race_swaps(backend: Arc<dyn StateBackend>) {
    let store = FailoverStateStore::new(backend, DEFAULT_STATE_KEY);
    let initial = store.initialize(RegionId::new("us-east-1")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..RACERS {
        let store = store.clone();
        let expected = initial.clone();
        handles.push(tokio::spawn(async move {
            let operation_id = Uuid::new_v4();
            let target = RegionId::new(format!("region-{}", i));
            let next = expected
                .clone()
                .begin_failover(target, operation_id, Utc::now())
                .unwrap();
            let won = store.compare_and_swap(&expected, &next).await.unwrap();
            (won, operation_id)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (won, operation_id) = handle.await.unwrap();
        if won {
            winners.push(operation_id);
        }
    }

    assert_eq!(winners.len(), 1, "exactly one swap must win");
    let stored = store.read().await.unwrap();
    assert_eq!(stored.phase, FailoverPhase::FailoverInProgress);
    assert!(stored.is_owned_by(winners[0]));
}

// =============================================================================
// Compare-and-swap
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_backend_single_cas_winner() {
    race_swaps(Arc::new(MemoryStateBackend::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_file_backend_single_cas_winner() {
    let tmp = TempDir::new().unwrap();
    race_swaps(Arc::new(FileStateBackend::new(tmp.path().join("state.json")))).await;
}

/// A swap against a stale record fails even when the phase matches.
#[tokio::test]
async fn test_stale_expected_record_loses() {
    let store = FailoverStateStore::new(Arc::new(MemoryStateBackend::new()), DEFAULT_STATE_KEY);
    let initial = store.initialize(RegionId::new("us-east-1")).await.unwrap();

    let first = initial
        .clone()
        .begin_failover(RegionId::new("us-west-2"), Uuid::new_v4(), Utc::now())
        .unwrap();
    assert!(store.compare_and_swap(&initial, &first).await.unwrap());

    let second = initial
        .clone()
        .begin_failover(RegionId::new("eu-west-1"), Uuid::new_v4(), Utc::now())
        .unwrap();
    assert!(!store.compare_and_swap(&initial, &second).await.unwrap());
    assert_eq!(store.read().await.unwrap(), first);
}

// =============================================================================
// At-most-once promotion
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_promotions_call_primitive_once() {
    let store = FailoverStateStore::new(Arc::new(MemoryStateBackend::new()), DEFAULT_STATE_KEY);
    let initial = store.initialize(RegionId::new("us-east-1")).await.unwrap();
    let promoter = Arc::new(MemoryPromoter::new());
    promoter.set_delay(Duration::from_millis(10));

    let settings = PromotionSettings {
        retry: RetryPolicy::fixed(Duration::from_millis(1)).max_attempts(3),
        call_timeout: Duration::from_millis(500),
        confirm_timeout: Duration::from_secs(1),
        confirm_interval: Duration::from_millis(5),
        commit_retry: RetryPolicy::fixed(Duration::from_millis(1)).max_attempts(3),
    };

    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let (tx, _rx) = mpsc::unbounded_channel();
        let coordinator = PromotionCoordinator::new(
            store.clone(),
            promoter.clone(),
            NotificationSink::new(tx),
            Arc::new(MetricsRegistry::new()),
            settings.clone(),
        );
        let expected = initial.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .promote(&RegionId::new("us-west-2"), &expected)
                .await
        }));
    }

    let mut promoted = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => promoted.push(outcome),
            Err(err) => {
                assert_eq!(err.kind, PromotionErrorKind::Conflict);
                conflicts += 1;
            }
        }
    }

    assert_eq!(promoted.len(), 1);
    assert_eq!(conflicts, RACERS - 1);
    assert_eq!(promoter.call_count(), 1);

    let stored = store.read().await.unwrap();
    assert_eq!(stored.phase, FailoverPhase::Promoted);
    assert!(stored.is_owned_by(promoted[0].operation_id));
}
