//! Logging and observability
//!
//! Structured logging through `tracing`, with a console layer and an optional
//! JSON file layer with rotation. The macros below keep event names and field
//! keys consistent across the extraction engine.

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of an extraction run
///
/// # Example
///
/// ```no_run
/// use harvest::log_extraction_start;
///
/// log_extraction_start!("run-1", 120, 80);
/// ```
#[macro_export]
macro_rules! log_extraction_start {
    ($run_id:expr, $total_keys:expr, $pending:expr) => {
        tracing::info!(
            run_id = %$run_id,
            total_keys = $total_keys,
            pending = $pending,
            "Starting extraction"
        );
    };
}

/// Log a committed checkpoint batch
#[macro_export]
macro_rules! log_batch_flush {
    ($batch_id:expr, $records:expr, $settled:expr, $total:expr) => {
        tracing::debug!(
            batch_id = $batch_id,
            records = $records,
            settled = $settled,
            total = $total,
            progress_pct = if $total == 0 {
                100.0
            } else {
                $settled as f64 / $total as f64 * 100.0
            },
            "Checkpoint batch committed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use harvest::log_error_with_context;
/// use harvest::domain::HarvestError;
///
/// let error = HarvestError::Configuration("Missing token".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use harvest::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying request"
        );
    };
}
