//! In-memory state of an extraction run
//!
//! Owned by the coordinator's control loop. Rebuilt from the checkpoint at
//! startup and updated after every committed flush.

use crate::domain::{OutcomeKind, SubscriberKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome counters
///
/// `total`, `success`, `empty` and `failed` describe the latest committed
/// outcome of every processed key. `rate_limited` counts throttling events
/// seen during this run only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub total: u64,
    pub success: u64,
    pub empty: u64,
    pub failed: u64,
    pub rate_limited: u64,
}

impl OutcomeCounts {
    fn slot(&mut self, kind: OutcomeKind) -> &mut u64 {
        match kind {
            OutcomeKind::Success => &mut self.success,
            OutcomeKind::Empty => &mut self.empty,
            OutcomeKind::Failed => &mut self.failed,
        }
    }
}

/// Processed keys and counters for one run
#[derive(Debug, Clone)]
pub struct RunState {
    processed: HashMap<SubscriberKey, OutcomeKind>,
    counts: OutcomeCounts,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            processed: HashMap::new(),
            counts: OutcomeCounts::default(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Record the committed outcome for `key`, replacing any earlier one
    pub fn record(&mut self, key: SubscriberKey, kind: OutcomeKind) {
        match self.processed.insert(key, kind) {
            Some(previous) => {
                let slot = self.counts.slot(previous);
                *slot = slot.saturating_sub(1);
            }
            None => self.counts.total += 1,
        }
        *self.counts.slot(kind) += 1;
    }

    /// Count throttling events observed while fetching
    pub fn note_rate_limited(&mut self, events: u64) {
        self.counts.rate_limited += events;
    }

    /// Latest committed outcome for `key`
    pub fn outcome(&self, key: &SubscriberKey) -> Option<OutcomeKind> {
        self.processed.get(key).copied()
    }

    /// Whether `key` needs no further fetching under the resume policy
    pub fn is_settled(&self, key: &SubscriberKey, retry_failed: bool) -> bool {
        match self.outcome(key) {
            Some(OutcomeKind::Failed) => !retry_failed,
            Some(_) => true,
            None => false,
        }
    }

    /// Keys from `keys` that still have to be fetched, in input order
    pub fn pending<'a, I>(&self, keys: I, retry_failed: bool) -> Vec<SubscriberKey>
    where
        I: IntoIterator<Item = &'a SubscriberKey>,
    {
        keys.into_iter()
            .filter(|key| !self.is_settled(key, retry_failed))
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    /// Number of keys with a committed outcome
    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Restart the clock for a new run over reconstructed state
    pub fn restart_clock(&mut self) {
        self.started_at = Utc::now();
        self.started = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SubscriberKey {
        SubscriberKey::new(s).unwrap()
    }

    #[test]
    fn test_record_counts() {
        let mut state = RunState::new();
        state.record(key("a@x.com"), OutcomeKind::Success);
        state.record(key("b@x.com"), OutcomeKind::Empty);
        state.record(key("c@x.com"), OutcomeKind::Failed);
        state.note_rate_limited(2);

        let counts = state.counts();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.success, 1);
        assert_eq!(counts.empty, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.rate_limited, 2);
    }

    #[test]
    fn test_last_write_wins() {
        let mut state = RunState::new();
        state.record(key("a@x.com"), OutcomeKind::Failed);
        state.record(key("a@x.com"), OutcomeKind::Success);

        let counts = state.counts();
        assert_eq!(counts.total, 1);
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.success, 1);
        assert_eq!(state.outcome(&key("a@x.com")), Some(OutcomeKind::Success));
    }

    #[test]
    fn test_pending_respects_resume_policy() {
        let mut state = RunState::new();
        state.record(key("a@x.com"), OutcomeKind::Success);
        state.record(key("b@x.com"), OutcomeKind::Failed);

        let keys = vec![key("a@x.com"), key("b@x.com"), key("c@x.com")];

        let pending = state.pending(&keys, false);
        assert_eq!(pending, vec![key("c@x.com")]);

        let pending = state.pending(&keys, true);
        assert_eq!(pending, vec![key("b@x.com"), key("c@x.com")]);
    }
}
