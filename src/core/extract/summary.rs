//! Extraction summary and reporting

use crate::core::state::OutcomeCounts;
use crate::domain::{FailureKind, SubscriberKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// A key whose fetch failed during this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyError {
    pub key: SubscriberKey,
    pub kind: FailureKind,
    pub message: String,
}

/// Summary of an extraction run
///
/// `total`, `success`, `empty` and `failed` are cumulative over the whole
/// checkpoint; `rate_limited` only counts throttling seen during this run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    /// Identifier of this run, as it appears in the logs
    pub run_id: String,

    /// Keys with a committed outcome
    pub total: u64,

    /// Keys with fields extracted
    pub success: u64,

    /// Keys with no data
    pub empty: u64,

    /// Keys that failed after retries
    pub failed: u64,

    /// Rate-limit events during this run
    pub rate_limited: u64,

    /// Keys left pending for a later run
    pub deferred: usize,

    /// Input keys skipped because the checkpoint already settled them
    pub previously_processed: usize,

    /// Keys committed during this run
    pub processed_this_run: usize,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the run
    #[serde(with = "duration_secs")]
    pub duration: Duration,

    /// The run stopped early because of a shutdown signal
    pub interrupted: bool,

    /// Why the run stopped early, if it did
    pub shutdown_reason: Option<String>,

    /// Set when a fatal error ended the run
    pub aborted: Option<String>,

    /// Failures recorded during this run
    pub errors: Vec<KeyError>,
}

impl ExtractionSummary {
    /// Create an empty summary for `run_id`
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            total: 0,
            success: 0,
            empty: 0,
            failed: 0,
            rate_limited: 0,
            deferred: 0,
            previously_processed: 0,
            processed_this_run: 0,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            interrupted: false,
            shutdown_reason: None,
            aborted: None,
            errors: Vec::new(),
        }
    }

    /// Copy the counters from run state
    pub fn with_counts(mut self, counts: OutcomeCounts) -> Self {
        self.total = counts.total;
        self.success = counts.success;
        self.empty = counts.empty;
        self.failed = counts.failed;
        self.rate_limited = counts.rate_limited;
        self
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// The run finished every key without failures
    pub fn is_successful(&self) -> bool {
        self.failed == 0 && self.deferred == 0 && !self.interrupted && self.aborted.is_none()
    }

    /// Successful keys as a percentage of processed keys
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.success as f64 / self.total as f64) * 100.0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            started_at = %self.started_at.to_rfc3339(),
            total = self.total,
            success = self.success,
            empty = self.empty,
            failed = self.failed,
            rate_limited = self.rate_limited,
            deferred = self.deferred,
            previously_processed = self.previously_processed,
            processed_this_run = self.processed_this_run,
            duration_secs = self.duration.as_secs(),
            success_rate = format!("{:.2}%", self.success_rate()),
            "Extraction finished"
        );

        if let Some(reason) = &self.aborted {
            tracing::error!(reason = %reason, "Extraction aborted");
        } else if let Some(reason) = &self.shutdown_reason {
            tracing::warn!(reason = %reason, "Extraction stopped early");
        }

        if !self.errors.is_empty() {
            tracing::warn!(error_count = self.errors.len(), "Extraction finished with errors");
            for error in &self.errors {
                tracing::debug!(
                    key = %error.key,
                    kind = %error.kind,
                    message = %error.message,
                    "Key failed"
                );
            }
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_creation() {
        let summary = ExtractionSummary::new("run-1");
        assert_eq!(summary.run_id, "run-1");
        assert_eq!(summary.total, 0);
        assert_eq!(summary.duration, Duration::ZERO);
        assert!(summary.errors.is_empty());
        assert!(summary.is_successful());
    }

    #[test]
    fn test_with_counts() {
        let counts = OutcomeCounts {
            total: 3,
            success: 2,
            empty: 1,
            failed: 0,
            rate_limited: 1,
        };
        let summary = ExtractionSummary::new("r").with_counts(counts);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.rate_limited, 1);
    }

    #[test]
    fn test_success_rate() {
        let mut summary = ExtractionSummary::new("r");
        assert_eq!(summary.success_rate(), 100.0);

        summary.total = 4;
        summary.success = 3;
        assert_eq!(summary.success_rate(), 75.0);
    }

    #[test]
    fn test_is_successful() {
        let mut summary = ExtractionSummary::new("r");
        summary.failed = 1;
        assert!(!summary.is_successful());

        summary.failed = 0;
        summary.interrupted = true;
        assert!(!summary.is_successful());

        summary.interrupted = false;
        summary.deferred = 2;
        assert!(!summary.is_successful());
    }

    #[test]
    fn test_serializes_duration_as_seconds() {
        let summary = ExtractionSummary::new("r").with_duration(Duration::from_millis(1500));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["duration"], 1.5);
    }
}
