//! Run phases and progress notifications

use crate::core::state::OutcomeCounts;
use serde::Serialize;
use std::fmt;

/// Lifecycle of an extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Starting,
    Loading,
    Running,
    Draining,
    Finalizing,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Starting => "starting",
            RunPhase::Loading => "loading",
            RunPhase::Running => "running",
            RunPhase::Draining => "draining",
            RunPhase::Finalizing => "finalizing",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a run, handed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Unique keys in the input
    pub total_keys: usize,
    /// Input keys that need no more work (skipped at start or committed since)
    pub settled: usize,
    /// Keys waiting to be dispatched
    pub queued: usize,
    /// Fetches currently running
    pub in_flight: usize,
    /// Outcomes waiting for the next flush
    pub buffered: usize,
    /// Batches committed during this run
    pub batches: u64,
    /// Cumulative outcome counters
    pub counts: OutcomeCounts,
}

/// Receives progress notifications from the coordinator
///
/// Callbacks run on the coordinator's control loop and must return quickly.
pub trait ProgressObserver: Send + Sync {
    /// The run moved to `phase`
    fn on_phase(&self, _phase: RunPhase) {}

    /// Dispatching is about to begin
    fn on_start(&self, _snapshot: &ProgressSnapshot) {}

    /// A batch was committed to the checkpoint
    fn on_flush(&self, snapshot: &ProgressSnapshot);
}
