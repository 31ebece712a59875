//! Extraction coordinator - drives a run from input keys to a summary
//!
//! The coordinator owns the run state and the outcome buffer. Fetches run as
//! independent tasks on a `JoinSet`; a single control loop dispatches them
//! through the rate limiter, collects their reports, flushes committed
//! batches to the checkpoint and reacts to the shutdown signal.

use crate::adapters::fetcher::RecordFetcher;
use crate::adapters::manychat::HttpRecordFetcher;
use crate::config::{ExtractionConfig, HarvestConfig};
use crate::core::extract::batch::RecordBuffer;
use crate::core::extract::progress::{ProgressObserver, ProgressSnapshot, RunPhase};
use crate::core::extract::summary::{ExtractionSummary, KeyError};
use crate::core::rate_limit::RateLimiter;
use crate::core::state::{CheckpointStore, JsonlCheckpointStore, RunState};
use crate::domain::{
    ExtractedRecord, FetchOutcome, FetchReport, HarvestError, Result, SubscriberKey,
};
use crate::{log_batch_flush, log_extraction_start};
use futures::FutureExt;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Tunables for the control loop
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    /// Maximum fetches in flight
    pub max_concurrency: usize,
    /// Records per checkpoint flush
    pub batch_size: usize,
    /// Flush at least this often
    pub flush_interval: Duration,
    /// How long draining waits for in-flight fetches
    pub shutdown_timeout: Duration,
    /// Re-queues allowed for a key that came back rate limited
    pub max_requeues: u32,
    /// Fetch keys whose checkpointed outcome is `failed` again
    pub retry_failed_on_resume: bool,
}

impl ExtractionSettings {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            batch_size: config.batch_size.max(1),
            flush_interval: Duration::from_secs(config.flush_interval_seconds.max(1)),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            max_requeues: config.max_requeues,
            retry_failed_on_resume: config.retry_failed_on_resume,
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

/// What a fetch task hands back: the key, its requeue count, and the report
/// (`None` when the fetch panicked)
type TaskOutput = (SubscriberKey, u32, Option<FetchReport>);

/// Mutable state of one `run` call
struct RunContext {
    run_id: String,
    state: RunState,
    buffer: RecordBuffer,
    queue: VecDeque<(SubscriberKey, u32)>,
    in_flight: HashSet<SubscriberKey>,
    deferred: Vec<SubscriberKey>,
    errors: Vec<KeyError>,
    total_keys: usize,
    previously_processed: usize,
    committed: usize,
    batches: u64,
}

impl RunContext {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_keys: self.total_keys,
            settled: self.previously_processed + self.committed,
            queued: self.queue.len(),
            in_flight: self.in_flight.len(),
            buffered: self.buffer.len(),
            batches: self.batches,
            counts: self.state.counts(),
        }
    }
}

/// Extraction coordinator
///
/// # Example
///
/// ```rust,no_run
/// use harvest::adapters::input::load_keys;
/// use harvest::config::load_config;
/// use harvest::core::extract::ExtractionCoordinator;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config("harvest.toml")?;
/// let keys = load_keys("subscribers.csv", &config.extraction.key_column)?.keys;
///
/// let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
/// let mut coordinator = ExtractionCoordinator::from_config(&config, shutdown_rx)?;
///
/// let summary = coordinator.run(keys).await?;
/// println!("{} succeeded, {} failed", summary.success, summary.failed);
/// # Ok(())
/// # }
/// ```
pub struct ExtractionCoordinator {
    settings: ExtractionSettings,
    fetcher: Arc<dyn RecordFetcher>,
    store: Box<dyn CheckpointStore>,
    limiter: Arc<RateLimiter>,
    shutdown: watch::Receiver<bool>,
    observer: Option<Arc<dyn ProgressObserver>>,
    phase: RunPhase,
    summary: Option<ExtractionSummary>,
}

impl ExtractionCoordinator {
    /// Assemble a coordinator from its collaborators
    ///
    /// `limiter` must be the same limiter the fetcher uses for its follow-up
    /// requests, so that every request start is counted once.
    pub fn new(
        settings: ExtractionSettings,
        fetcher: Arc<dyn RecordFetcher>,
        store: Box<dyn CheckpointStore>,
        limiter: Arc<RateLimiter>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            store,
            limiter,
            shutdown,
            observer: None,
            phase: RunPhase::Starting,
            summary: None,
        }
    }

    /// Build the HTTP fetcher, JSON Lines store and rate limiter from configuration
    ///
    /// # Errors
    ///
    /// `Configuration` when the HTTP client cannot be built
    pub fn from_config(config: &HarvestConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(
            config.extraction.requests_per_second,
            Duration::from_millis(config.extraction.rate_window_ms),
        ));
        let fetcher = Arc::new(HttpRecordFetcher::new(&config.api, Arc::clone(&limiter))?);
        let store = Box::new(JsonlCheckpointStore::new(&config.extraction.checkpoint_path));

        Ok(Self::new(
            ExtractionSettings::from_config(&config.extraction),
            fetcher,
            store,
            limiter,
            shutdown,
        ))
    }

    /// Attach a progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Summary of the last finished run, including aborted ones
    pub fn summary(&self) -> Option<&ExtractionSummary> {
        self.summary.as_ref()
    }

    fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
        tracing::debug!(phase = %phase, "Extraction phase changed");
        if let Some(observer) = &self.observer {
            observer.on_phase(phase);
        }
    }

    /// Run the extraction for `keys`
    ///
    /// Keys are deduplicated (first occurrence wins) and keys the checkpoint
    /// already settled are skipped.
    ///
    /// # Errors
    ///
    /// - `Validation` when `keys` is empty
    /// - `Checkpoint` when the checkpoint cannot be read or written; the
    ///   summary of the aborted run stays available through [`Self::summary`]
    pub async fn run(&mut self, keys: Vec<SubscriberKey>) -> Result<ExtractionSummary> {
        self.summary = None;
        self.set_phase(RunPhase::Starting);

        let mut seen = HashSet::with_capacity(keys.len());
        let keys: Vec<SubscriberKey> = keys.into_iter().filter(|k| seen.insert(k.clone())).collect();
        if keys.is_empty() {
            self.set_phase(RunPhase::Done);
            return Err(HarvestError::Validation(
                "no input keys to process".to_string(),
            ));
        }

        self.set_phase(RunPhase::Loading);
        let mut state = match self.store.load() {
            Ok(state) => state,
            Err(HarvestError::CorruptState(reason)) => {
                tracing::warn!(reason = %reason, "Checkpoint is corrupt, starting fresh");
                if let Err(e) = self.store.quarantine() {
                    self.set_phase(RunPhase::Done);
                    return Err(e);
                }
                RunState::new()
            }
            Err(e) => {
                self.set_phase(RunPhase::Done);
                return Err(e);
            }
        };
        state.restart_clock();

        let pending = state.pending(&keys, self.settings.retry_failed_on_resume);
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut ctx = RunContext {
            run_id,
            previously_processed: keys.len() - pending.len(),
            total_keys: keys.len(),
            queue: pending.into_iter().map(|key| (key, 0)).collect(),
            state,
            buffer: RecordBuffer::new(self.settings.batch_size),
            in_flight: HashSet::new(),
            deferred: Vec::new(),
            errors: Vec::new(),
            committed: 0,
            batches: 0,
        };

        log_extraction_start!(ctx.run_id, ctx.total_keys, ctx.queue.len());

        self.set_phase(RunPhase::Running);
        if let Some(observer) = &self.observer {
            observer.on_start(&ctx.snapshot());
        }

        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
        let (stop_reason, mut fatal) = self.dispatch_loop(&mut ctx, &mut tasks).await;

        if !tasks.is_empty() {
            self.set_phase(RunPhase::Draining);
            if let Err(e) = self.drain(&mut ctx, &mut tasks, fatal.is_none()).await {
                fatal.get_or_insert(e);
            }
        }

        self.set_phase(RunPhase::Finalizing);
        if let Err(e) = self.flush(&mut ctx) {
            match &fatal {
                Some(_) => tracing::error!(error = %e, "Final flush failed"),
                None => fatal = Some(e),
            }
        }

        let summary = self.build_summary(ctx, stop_reason, fatal.as_ref());
        summary.log_summary();
        self.summary = Some(summary.clone());
        self.set_phase(RunPhase::Done);

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Dispatch and collect until the queue is exhausted or the run must stop
    ///
    /// Returns why the run stopped early (if it did) and any fatal error.
    async fn dispatch_loop(
        &mut self,
        ctx: &mut RunContext,
        tasks: &mut JoinSet<TaskOutput>,
    ) -> (Option<String>, Option<HarvestError>) {
        let limiter = Arc::clone(&self.limiter);
        let mut shutdown = self.shutdown.clone();

        let mut flush_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + self.settings.flush_interval,
            self.settings.flush_interval,
        );
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let can_dispatch =
                !ctx.queue.is_empty() && tasks.len() < self.settings.max_concurrency;
            if !can_dispatch && tasks.is_empty() {
                return (None, None);
            }

            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::warn!(
                        in_flight = tasks.len(),
                        queued = ctx.queue.len(),
                        "Shutdown requested, draining"
                    );
                    return (Some("interrupted by shutdown signal".to_string()), None);
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.complete(ctx, joined);
                }

                _ = flush_tick.tick() => {
                    if let Err(e) = self.flush(ctx) {
                        return (Some(format!("checkpoint failure: {e}")), Some(e));
                    }
                }

                _ = limiter.acquire(), if can_dispatch => {
                    if let Some((key, requeues)) = ctx.queue.pop_front() {
                        self.spawn_fetch(ctx, tasks, key, requeues);
                    }
                }
            }

            if ctx.buffer.is_full() {
                if let Err(e) = self.flush(ctx) {
                    return (Some(format!("checkpoint failure: {e}")), Some(e));
                }
            }
        }
    }

    fn spawn_fetch(
        &self,
        ctx: &mut RunContext,
        tasks: &mut JoinSet<TaskOutput>,
        key: SubscriberKey,
        requeues: u32,
    ) {
        tracing::debug!(key = %key, requeues, "Dispatching fetch");
        ctx.in_flight.insert(key.clone());

        let fetcher = Arc::clone(&self.fetcher);
        tasks.spawn(async move {
            let report = AssertUnwindSafe(fetcher.fetch(&key))
                .catch_unwind()
                .await
                .ok();
            (key, requeues, report)
        });
    }

    /// Fold one finished task into the run
    fn complete(
        &mut self,
        ctx: &mut RunContext,
        joined: std::result::Result<TaskOutput, tokio::task::JoinError>,
    ) {
        let (key, requeues, report) = match joined {
            Ok(output) => output,
            Err(e) => {
                // Only aborted tasks end up here; their keys are accounted for after draining
                tracing::debug!(error = %e, "Fetch task did not finish");
                return;
            }
        };
        ctx.in_flight.remove(&key);

        let Some(report) = report else {
            tracing::error!(key = %key, "Fetch task panicked, key stays pending");
            ctx.deferred.push(key);
            return;
        };

        let throttled = !report.outcome.is_terminal();
        let events = report.rate_limit_events.max(u32::from(throttled));
        ctx.state.note_rate_limited(u64::from(events));

        match report.outcome {
            FetchOutcome::RateLimited { retry_after } => {
                if requeues < self.settings.max_requeues {
                    tracing::info!(
                        key = %key,
                        requeues = requeues + 1,
                        retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                        "Rate limited, re-queueing key"
                    );
                    ctx.queue.push_back((key, requeues + 1));
                } else {
                    tracing::warn!(key = %key, "Rate limited too often, deferring key");
                    ctx.deferred.push(key);
                }
            }
            outcome => {
                if let FetchOutcome::Failed { kind, message } = &outcome {
                    ctx.errors.push(KeyError {
                        key: key.clone(),
                        kind: *kind,
                        message: message.clone(),
                    });
                }
                tracing::debug!(
                    key = %key,
                    outcome = ?outcome.kind(),
                    attempts = report.attempts,
                    "Fetch finished"
                );
                if let Some(record) = ExtractedRecord::from_outcome(key, outcome) {
                    ctx.buffer.push(record);
                }
            }
        }
    }

    /// Wait for in-flight fetches, bounded by the shutdown timeout
    async fn drain(
        &mut self,
        ctx: &mut RunContext,
        tasks: &mut JoinSet<TaskOutput>,
        mut flush_when_full: bool,
    ) -> Result<()> {
        tracing::info!(
            in_flight = tasks.len(),
            timeout_secs = self.settings.shutdown_timeout.as_secs(),
            "Waiting for in-flight fetches"
        );

        let deadline = tokio::time::sleep(self.settings.shutdown_timeout);
        tokio::pin!(deadline);
        let mut result = Ok(());

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    tracing::warn!(
                        abandoned = tasks.len(),
                        "Drain timeout reached, abandoning in-flight fetches"
                    );
                    tasks.shutdown().await;
                    break;
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    self.complete(ctx, joined);
                    if flush_when_full && ctx.buffer.is_full() {
                        if let Err(e) = self.flush(ctx) {
                            flush_when_full = false;
                            result = Err(e);
                        }
                    }
                }
            }
        }

        result
    }

    /// Commit the buffer to the checkpoint and update run state
    fn flush(&mut self, ctx: &mut RunContext) -> Result<()> {
        if ctx.buffer.is_empty() {
            return Ok(());
        }

        let records = ctx.buffer.take();
        if let Err(e) = self.store.append(&records) {
            tracing::error!(error = %e, records = records.len(), "Checkpoint flush failed");
            ctx.buffer.restore(records);
            return Err(if e.is_fatal() {
                e
            } else {
                HarvestError::Checkpoint(e.to_string())
            });
        }

        for record in &records {
            ctx.state.record(record.key.clone(), record.outcome);
        }
        ctx.committed += records.len();
        ctx.batches += 1;

        let snapshot = ctx.snapshot();
        log_batch_flush!(ctx.batches, records.len(), snapshot.settled, snapshot.total_keys);
        if let Some(observer) = &self.observer {
            observer.on_flush(&snapshot);
        }

        Ok(())
    }

    fn build_summary(
        &self,
        ctx: RunContext,
        stop_reason: Option<String>,
        fatal: Option<&HarvestError>,
    ) -> ExtractionSummary {
        let RunContext {
            run_id,
            state,
            buffer,
            queue,
            in_flight,
            deferred,
            errors,
            previously_processed,
            committed,
            ..
        } = ctx;

        // Everything not committed stays pending for the next run
        let mut pending: HashSet<SubscriberKey> = deferred.into_iter().collect();
        pending.extend(queue.into_iter().map(|(key, _)| key));
        pending.extend(in_flight);
        pending.extend(buffer.records().iter().map(|r| r.key.clone()));

        let mut summary = ExtractionSummary::new(run_id)
            .with_counts(state.counts())
            .with_duration(state.elapsed());
        summary.started_at = state.started_at();
        summary.deferred = pending.len();
        summary.previously_processed = previously_processed;
        summary.processed_this_run = committed;
        summary.interrupted = stop_reason.is_some() && fatal.is_none();
        summary.shutdown_reason = stop_reason;
        summary.aborted = fatal.map(ToString::to_string);
        summary.errors = errors;
        summary
    }
}

/// Resolve once shutdown has been requested
///
/// A dropped sender means nobody can request shutdown any more.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
