//! Domain error types
//!
//! This module defines the error hierarchy for Harvest.
//! All errors are domain-specific and don't expose third-party types.

use crate::domain::record::FailureKind;
use std::time::Duration;
use thiserror::Error;

/// Main Harvest error type
///
/// This is the primary error type used throughout the application.
/// Only `Configuration` and `Checkpoint` errors are fatal to a running
/// extraction; per-key API errors are folded into a fetch outcome instead.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Input file errors (missing key column, unreadable rows)
    #[error("Input error: {0}")]
    Input(String),

    /// Remote API errors surfaced outside of a fetch
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Checkpoint persistence failed; the run cannot stay resumable
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Persisted checkpoint could not be parsed
    #[error("Corrupt checkpoint state: {0}")]
    CorruptState(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl HarvestError {
    /// Whether this error must stop a running extraction
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::Configuration(_) | HarvestError::Checkpoint(_)
        )
    }
}

/// Errors from a single request against the messaging platform API
///
/// These errors don't expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure (connect, reset, body read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Quota exhausted; not really an error, the caller should wait and retry
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Non-2xx status other than 429
    #[error("HTTP error: {status} - {body}")]
    Http { status: u16, body: String },

    /// The body did not match the expected contract
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// Whether the fetcher should retry this error with backoff
    ///
    /// Rate limiting is handled by its own retry budget and is not counted here.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) | ApiError::Timeout(_) => true,
            ApiError::Http { status, .. } => *status >= 500 || *status == 408,
            ApiError::RateLimited { .. } | ApiError::MalformedResponse(_) => false,
        }
    }

    /// The failure kind this error is recorded as when it becomes terminal
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ApiError::Transport(_) => FailureKind::Transport,
            ApiError::Timeout(_) => FailureKind::Timeout,
            ApiError::RateLimited { .. } | ApiError::Http { .. } => FailureKind::HttpError,
            ApiError::MalformedResponse(_) => FailureKind::MalformedResponse,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for HarvestError {
    fn from(err: toml::de::Error) -> Self {
        HarvestError::Configuration(format!("TOML parse error: {err}"))
    }
}
