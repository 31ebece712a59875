//! HTTP record fetcher
//!
//! Resolves a subscriber by email, then reads its custom fields. Both calls go
//! through the shared [`RateLimiter`] and a bounded retry loop; whatever
//! happens, the result is a classified [`FetchReport`].

use super::client::ManyChatClient;
use super::models::select_fields;
use crate::adapters::fetcher::RecordFetcher;
use crate::config::{ApiConfig, RetryConfig};
use crate::core::rate_limit::RateLimiter;
use crate::domain::{ApiError, FetchOutcome, FetchReport, Result, SubscriberKey};
use crate::log_retry_attempt;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// [`RecordFetcher`] backed by the messaging platform API
///
/// # Example
///
/// ```rust,no_run
/// use harvest::adapters::manychat::HttpRecordFetcher;
/// use harvest::adapters::RecordFetcher;
/// use harvest::config::load_config;
/// use harvest::core::rate_limit::RateLimiter;
/// use harvest::domain::SubscriberKey;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config("harvest.toml")?;
/// let limiter = Arc::new(RateLimiter::per_second(10));
/// let fetcher = HttpRecordFetcher::new(&config.api, limiter.clone())?;
///
/// limiter.acquire().await;
/// let report = fetcher.fetch(&SubscriberKey::new("someone@example.com")?).await;
/// println!("{:?} after {} requests", report.outcome, report.attempts);
/// # Ok(())
/// # }
/// ```
pub struct HttpRecordFetcher {
    client: ManyChatClient,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    fields: Vec<String>,
}

/// Per-fetch request accounting
#[derive(Debug)]
struct Tally<'a> {
    limiter: &'a RateLimiter,
    /// The caller's permit for the first request has not been used yet
    admitted: bool,
    attempts: u32,
    rate_limit_events: u32,
}

impl<'a> Tally<'a> {
    fn new(limiter: &'a RateLimiter) -> Self {
        Self {
            limiter,
            admitted: true,
            attempts: 0,
            rate_limit_events: 0,
        }
    }

    /// Take a permit for the next request start
    async fn admit(&mut self) {
        if self.admitted {
            self.admitted = false;
        } else {
            self.limiter.acquire().await;
        }
        self.attempts += 1;
    }

    fn report(&self, outcome: FetchOutcome) -> FetchReport {
        FetchReport::new(outcome)
            .with_attempts(self.attempts)
            .with_rate_limit_events(self.rate_limit_events)
    }
}

impl HttpRecordFetcher {
    /// Create a fetcher sharing `limiter` with the rest of the run
    ///
    /// # Errors
    ///
    /// `Configuration` when the HTTP client cannot be built
    pub fn new(config: &ApiConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        Ok(Self {
            client: ManyChatClient::new(config)?,
            limiter,
            retry: config.retry.clone(),
            fields: config.fields.clone(),
        })
    }

    /// Backoff before retry number `retry` (1-based), capped at `max_delay_ms`
    fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.retry.initial_delay_ms as f64 * self.retry.backoff_multiplier.powi(exponent);
        let delay_ms = delay_ms.min(self.retry.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Wait after a rate-limit signal, capped at `rate_limit_max_wait_ms`
    fn cooldown(&self, retry_after: Option<Duration>) -> Duration {
        let ceiling = Duration::from_millis(self.retry.rate_limit_max_wait_ms);
        retry_after
            .unwrap_or_else(|| Duration::from_millis(self.retry.rate_limit_fallback_ms))
            .min(ceiling)
    }

    /// Run one request with the retry policy applied
    ///
    /// Rate-limit signals draw from a budget shared by the whole fetch; other
    /// retryable errors draw from a budget local to this request.
    async fn with_retries<T, F, Fut>(
        &self,
        key: &SubscriberKey,
        tally: &mut Tally<'_>,
        mut request: F,
    ) -> std::result::Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        let mut failures = 0u32;

        loop {
            tally.admit().await;

            match request().await {
                Ok(value) => return Ok(value),
                Err(ApiError::RateLimited { retry_after }) => {
                    tally.rate_limit_events += 1;
                    if tally.rate_limit_events > self.retry.rate_limit_max_retries {
                        tracing::warn!(
                            key = %key,
                            events = tally.rate_limit_events,
                            "Rate limit retries exhausted"
                        );
                        return Err(ApiError::RateLimited { retry_after });
                    }

                    let wait = self.cooldown(retry_after);
                    tracing::warn!(
                        key = %key,
                        event = tally.rate_limit_events,
                        delay_ms = wait.as_millis() as u64,
                        "Rate limited, cooling down"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) if err.is_retryable() && failures < self.retry.max_retries => {
                    failures += 1;
                    let delay = self.backoff_delay(failures);
                    log_retry_attempt!(failures, self.retry.max_retries, err);
                    tracing::debug!(
                        key = %key,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn lookup(
        &self,
        key: &SubscriberKey,
        tally: &mut Tally<'_>,
    ) -> std::result::Result<FetchOutcome, ApiError> {
        let found = self
            .with_retries(key, tally, || self.client.find_by_email(key))
            .await?;

        let Some(remote_id) = found.identity()? else {
            tracing::debug!(key = %key, "No subscriber found");
            return Ok(FetchOutcome::EmptyResult);
        };

        let info = self
            .with_retries(key, tally, || self.client.subscriber_info(&remote_id))
            .await?;

        let Some(custom_fields) = info.custom_fields()? else {
            tracing::debug!(key = %key, remote_id = %remote_id, "Subscriber has no data");
            return Ok(FetchOutcome::EmptyResult);
        };

        let fields = select_fields(custom_fields, &self.fields);
        if fields.is_empty() {
            tracing::debug!(
                key = %key,
                remote_id = %remote_id,
                "Subscriber has none of the selected fields"
            );
            return Ok(FetchOutcome::EmptyResult);
        }

        Ok(FetchOutcome::Success { fields, remote_id })
    }
}

#[async_trait]
impl RecordFetcher for HttpRecordFetcher {
    async fn fetch(&self, key: &SubscriberKey) -> FetchReport {
        let mut tally = Tally::new(&self.limiter);

        let outcome = match self.lookup(key, &mut tally).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, attempts = tally.attempts, "Fetch failed");
                FetchOutcome::Failed {
                    kind: err.failure_kind(),
                    message: err.to_string(),
                }
            }
        };

        tally.report(outcome)
    }
}
