//! Integration tests for graceful shutdown
//!
//! These tests verify that:
//! - Shutdown signals are properly handled
//! - Committed progress survives an interrupted run
//! - An interrupted run resumes without refetching committed keys

use async_trait::async_trait;
use harvest::adapters::RecordFetcher;
use harvest::core::extract::{ExtractionCoordinator, ExtractionSettings, RunPhase};
use harvest::core::rate_limit::RateLimiter;
use harvest::core::state::{CheckpointStore, JsonlCheckpointStore};
use harvest::domain::{FetchOutcome, FetchReport, SubscriberKey};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

/// Fetcher that takes a fixed time per key
struct SlowFetcher {
    latency: Duration,
    calls: Mutex<Vec<String>>,
}

impl SlowFetcher {
    fn new(latency: Duration) -> Self {
        Self {
            latency,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordFetcher for SlowFetcher {
    async fn fetch(&self, key: &SubscriberKey) -> FetchReport {
        self.calls.lock().unwrap().push(key.to_string());
        tokio::time::sleep(self.latency).await;
        FetchReport::new(FetchOutcome::EmptyResult)
    }
}

fn input(count: usize) -> Vec<SubscriberKey> {
    (0..count)
        .map(|i| SubscriberKey::new(format!("user{i}@x.com")).unwrap())
        .collect()
}

fn settings(shutdown_timeout: Duration) -> ExtractionSettings {
    ExtractionSettings {
        max_concurrency: 3,
        batch_size: 2,
        flush_interval: Duration::from_secs(1),
        shutdown_timeout,
        max_requeues: 3,
        retry_failed_on_resume: false,
    }
}

#[tokio::test]
async fn test_shutdown_signal_propagation() {
    let (shutdown_tx, shutdown_rx1) = watch::channel(false);
    let shutdown_rx2 = shutdown_rx1.clone();

    assert!(!*shutdown_rx1.borrow());
    assert!(!*shutdown_rx2.borrow());

    shutdown_tx.send(true).unwrap();

    assert!(*shutdown_rx1.borrow());
    assert!(*shutdown_rx2.borrow());
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_run_saves_progress_and_resumes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checkpoint.jsonl");
    let keys = input(20);

    let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(500)));
    let (tx, rx) = watch::channel(false);
    let mut coordinator = ExtractionCoordinator::new(
        settings(Duration::from_secs(10)),
        fetcher.clone(),
        Box::new(JsonlCheckpointStore::new(&path)),
        Arc::new(RateLimiter::per_second(100)),
        rx,
    );

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1200)).await;
        tx.send(true).unwrap();
        tx
    });

    let summary = coordinator.run(keys.clone()).await.unwrap();
    let _tx = stopper.await.unwrap();

    assert!(summary.interrupted);
    assert!(summary.shutdown_reason.is_some());
    assert!(summary.aborted.is_none());
    assert_eq!(coordinator.phase(), RunPhase::Done);

    // Fetches in flight at the signal were allowed to finish
    let first_calls = fetcher.calls();
    assert!(first_calls.len() < keys.len());
    assert_eq!(summary.processed_this_run, first_calls.len());
    assert_eq!(summary.total as usize + summary.deferred, keys.len());

    let committed = JsonlCheckpointStore::new(&path).load().unwrap();
    assert_eq!(committed.processed_len(), first_calls.len());

    // Resume with a fresh signal
    let resumed_fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(500)));
    let (_tx, rx) = watch::channel(false);
    let mut coordinator = ExtractionCoordinator::new(
        settings(Duration::from_secs(10)),
        resumed_fetcher.clone(),
        Box::new(JsonlCheckpointStore::new(&path)),
        Arc::new(RateLimiter::per_second(100)),
        rx,
    );
    let summary = coordinator.run(keys.clone()).await.unwrap();

    assert!(!summary.interrupted);
    assert_eq!(summary.total as usize, keys.len());
    assert_eq!(summary.previously_processed, first_calls.len());
    assert_eq!(summary.deferred, 0);

    let first: HashSet<String> = first_calls.into_iter().collect();
    let second: HashSet<String> = resumed_fetcher.calls().into_iter().collect();
    assert!(first.is_disjoint(&second));
    assert_eq!(first.len() + second.len(), keys.len());
}

#[tokio::test(start_paused = true)]
async fn test_drain_timeout_leaves_slow_keys_pending() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checkpoint.jsonl");
    let keys = input(6);

    let fetcher = Arc::new(SlowFetcher::new(Duration::from_secs(60)));
    let (tx, rx) = watch::channel(false);
    let mut coordinator = ExtractionCoordinator::new(
        settings(Duration::from_secs(2)),
        fetcher.clone(),
        Box::new(JsonlCheckpointStore::new(&path)),
        Arc::new(RateLimiter::per_second(100)),
        rx,
    );

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tx
    });

    let started = tokio::time::Instant::now();
    let summary = coordinator.run(keys.clone()).await.unwrap();
    let _tx = stopper.await.unwrap();

    // Bounded by the drain timeout, not the fetch latency
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(summary.interrupted);
    assert_eq!(summary.total, 0);
    assert_eq!(summary.deferred, keys.len());
    assert_eq!(fetcher.calls().len(), 3);

    let state = JsonlCheckpointStore::new(&path).load().unwrap();
    assert_eq!(state.pending(&keys, false).len(), keys.len());
}
