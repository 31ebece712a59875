//! Domain models and types for Harvest.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`SubscriberKey`], [`RemoteId`])
//! - **Fetch outcomes and records** ([`FetchOutcome`], [`ExtractedRecord`])
//! - **Error types** ([`HarvestError`], [`ApiError`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! Keys are normalized on construction, so two spellings of the same email
//! can never be scheduled twice:
//!
//! ```rust
//! use harvest::domain::SubscriberKey;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let a = SubscriberKey::new("Someone@Example.com")?;
//! let b = SubscriberKey::new("someone@example.com ")?;
//! assert_eq!(a, b);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod errors;
pub mod ids;
pub mod record;
pub mod result;

// Re-export commonly used types for convenience
pub use context::ResultExt;
pub use errors::{ApiError, HarvestError};
pub use ids::{RemoteId, SubscriberKey};
pub use record::{
    ExtractedRecord, FailureKind, FetchOutcome, FetchReport, FieldMap, OutcomeKind, RecordError,
};
pub use result::Result;
