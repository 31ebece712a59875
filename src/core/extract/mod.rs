//! Extraction orchestration
//!
//! This module drives an extraction run:
//! - Outcome buffering between checkpoint flushes
//! - The coordinator's dispatch, collect and drain loop
//! - Progress reporting and the end-of-run summary

pub mod batch;
pub mod coordinator;
pub mod progress;
pub mod summary;

pub use batch::RecordBuffer;
pub use coordinator::{ExtractionCoordinator, ExtractionSettings};
pub(crate) use coordinator::wait_for_shutdown;
pub use progress::{ProgressObserver, ProgressSnapshot, RunPhase};
pub use summary::{ExtractionSummary, KeyError};
