//! Record fetcher abstraction
//!
//! The extraction engine only depends on this trait, so the HTTP
//! implementation can be swapped for scripted fetchers in tests.

use crate::domain::{FetchReport, SubscriberKey};
use async_trait::async_trait;
use std::sync::Arc;

/// Performs the lookup for one key and classifies the result
///
/// Implementations never return an error: every failure is folded into the
/// [`FetchOutcome`](crate::domain::FetchOutcome) carried by the report.
///
/// The caller has already taken a rate-limit permit for the first request of
/// each call; implementations acquire their own permits for any further
/// requests.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    /// Fetch and classify the data for `key`
    async fn fetch(&self, key: &SubscriberKey) -> FetchReport;
}

#[async_trait]
impl<T> RecordFetcher for Arc<T>
where
    T: RecordFetcher + ?Sized,
{
    async fn fetch(&self, key: &SubscriberKey) -> FetchReport {
        (**self).fetch(key).await
    }
}
