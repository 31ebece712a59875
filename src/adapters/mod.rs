//! External system integrations for Harvest.
//!
//! - [`fetcher`] - the [`RecordFetcher`] seam the extraction engine depends on
//! - [`manychat`] - messaging platform API client and HTTP fetcher
//! - [`input`] - CSV key loader
//! - [`output`] - CSV materializer for checkpointed records
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind small interfaces so the
//! engine can be exercised with scripted implementations in tests.

pub mod fetcher;
pub mod input;
pub mod manychat;
pub mod output;

pub use fetcher::RecordFetcher;
