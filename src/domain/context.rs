//! Error context extension trait
//!
//! Similar to `anyhow::Context`, but keeps library code on
//! `Result<T, HarvestError>`. Context is prefixed to the message of the
//! wrapped error and the variant is kept, so a checkpoint failure stays a
//! checkpoint failure after being annotated.
//!
//! # Examples
//!
//! ```rust
//! use harvest::domain::context::ResultExt;
//! use harvest::domain::Result;
//!
//! fn read_input(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))
//! }
//! ```

use crate::domain::errors::HarvestError;
use crate::domain::result::Result;
use std::fmt::Display;

/// Extension trait for adding context to `Result` types
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context computed only when an error occurs
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<HarvestError>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| annotate(e.into(), context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| annotate(e.into(), f()))
    }
}

fn annotate(error: HarvestError, context: impl Display) -> HarvestError {
    match error {
        HarvestError::Configuration(m) => HarvestError::Configuration(format!("{context}: {m}")),
        HarvestError::Validation(m) => HarvestError::Validation(format!("{context}: {m}")),
        HarvestError::Input(m) => HarvestError::Input(format!("{context}: {m}")),
        HarvestError::Checkpoint(m) => HarvestError::Checkpoint(format!("{context}: {m}")),
        HarvestError::CorruptState(m) => HarvestError::CorruptState(format!("{context}: {m}")),
        HarvestError::Serialization(m) => HarvestError::Serialization(format!("{context}: {m}")),
        HarvestError::Io(m) => HarvestError::Io(format!("{context}: {m}")),
        other => HarvestError::Other(format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApiError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_context_keeps_variant() {
        let result: Result<()> = Err(HarvestError::Checkpoint("disk full".to_string()));
        let err = result.context("Flushing batch 3").unwrap_err();

        assert!(matches!(err, HarvestError::Checkpoint(_)));
        assert!(err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("Flushing batch 3"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_context_on_io_error() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.context("Failed to write out.csv").unwrap_err();

        assert!(matches!(err, HarvestError::Io(_)));
        assert!(err.to_string().contains("Failed to write out.csv"));
    }

    #[test]
    fn test_api_error_becomes_other() {
        let result: std::result::Result<(), ApiError> =
            Err(ApiError::Transport("connection reset".to_string()));
        let err = result.context("Looking up a@x.com").unwrap_err();

        assert!(matches!(err, HarvestError::Other(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_with_context_is_lazy() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();

        let result: Result<i32> = Ok(42);
        let value = result
            .with_context(|| {
                flag.store(true, Ordering::SeqCst);
                "never built"
            })
            .unwrap();

        assert_eq!(value, 42);
        assert!(!called.load(Ordering::SeqCst));
    }
}
