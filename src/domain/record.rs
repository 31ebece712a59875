//! Fetch outcomes and the persisted extraction record
//!
//! A [`FetchOutcome`] is what one lookup produced; an [`ExtractedRecord`] is the
//! durable form of a terminal outcome as written to the checkpoint.

use crate::domain::ids::{RemoteId, SubscriberKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Custom field values keyed by field name
pub type FieldMap = BTreeMap<String, Value>;

/// Why a fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network-level failure
    Transport,
    /// Body did not match the API contract
    MalformedResponse,
    /// Non-2xx status, including rate limiting that outlived its retries
    HttpError,
    /// Request timed out
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transport => "transport",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::HttpError => "http_error",
            FailureKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Classified result of fetching one key
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Identity resolved and at least one field returned
    Success { fields: FieldMap, remote_id: RemoteId },
    /// No matching subscriber, or no data for it
    EmptyResult,
    /// Quota exhausted; never terminal
    RateLimited { retry_after: Option<Duration> },
    /// Terminal failure after the fetcher's retry budget
    Failed { kind: FailureKind, message: String },
}

impl FetchOutcome {
    /// Terminal outcomes are checkpointed; `RateLimited` is not
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FetchOutcome::RateLimited { .. })
    }

    /// The persisted kind for terminal outcomes
    pub fn kind(&self) -> Option<OutcomeKind> {
        match self {
            FetchOutcome::Success { .. } => Some(OutcomeKind::Success),
            FetchOutcome::EmptyResult => Some(OutcomeKind::Empty),
            FetchOutcome::Failed { .. } => Some(OutcomeKind::Failed),
            FetchOutcome::RateLimited { .. } => None,
        }
    }
}

/// What a fetcher reports back for one key
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    /// Final classified outcome
    pub outcome: FetchOutcome,
    /// HTTP requests issued, retries included
    pub attempts: u32,
    /// Rate-limit signals seen along the way (each one a transient event)
    pub rate_limit_events: u32,
}

impl FetchReport {
    /// Report for an outcome reached with a single request and no throttling
    pub fn new(outcome: FetchOutcome) -> Self {
        Self {
            outcome,
            attempts: 1,
            rate_limit_events: 0,
        }
    }

    /// Set the number of rate-limit events
    pub fn with_rate_limit_events(mut self, events: u32) -> Self {
        self.rate_limit_events = events;
        self
    }

    /// Set the number of attempts
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Terminal outcome kind as persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Empty,
    Failed,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Empty => "empty",
            OutcomeKind::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Error details kept on a failed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub kind: FailureKind,
    pub message: String,
}

/// The persisted unit of an extraction
///
/// At most one record per key is meaningful; when a checkpoint contains
/// several, the last one written wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Subscriber key (email)
    pub key: SubscriberKey,

    /// Remote identity, when one was resolved
    #[serde(default)]
    pub remote_id: Option<RemoteId>,

    /// Extracted custom fields
    #[serde(default)]
    pub fields: FieldMap,

    /// When the outcome was produced
    pub processed_at: DateTime<Utc>,

    /// Terminal outcome kind
    pub outcome: OutcomeKind,

    /// Failure details for `failed` records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordError>,
}

impl ExtractedRecord {
    /// Build the persisted record for a terminal outcome
    ///
    /// Returns `None` for `RateLimited`, which must never be checkpointed.
    pub fn from_outcome(key: SubscriberKey, outcome: FetchOutcome) -> Option<Self> {
        let processed_at = Utc::now();
        match outcome {
            FetchOutcome::Success { fields, remote_id } => Some(Self {
                key,
                remote_id: Some(remote_id),
                fields,
                processed_at,
                outcome: OutcomeKind::Success,
                error: None,
            }),
            FetchOutcome::EmptyResult => Some(Self {
                key,
                remote_id: None,
                fields: FieldMap::new(),
                processed_at,
                outcome: OutcomeKind::Empty,
                error: None,
            }),
            FetchOutcome::Failed { kind, message } => Some(Self {
                key,
                remote_id: None,
                fields: FieldMap::new(),
                processed_at,
                outcome: OutcomeKind::Failed,
                error: Some(RecordError { kind, message }),
            }),
            FetchOutcome::RateLimited { .. } => None,
        }
    }

    /// Render a field value as plain text (strings unquoted)
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}
