//! Messaging platform API adapter
//!
//! - [`client`] - bearer-authenticated HTTP calls returning the response envelope
//! - [`fetcher`] - [`RecordFetcher`](crate::adapters::RecordFetcher) implementation
//!   with the retry policy and outcome classification
//! - [`models`] - wire types

pub mod client;
pub mod fetcher;
pub mod models;

pub use client::ManyChatClient;
pub use fetcher::HttpRecordFetcher;
pub use models::{CustomField, Envelope};
