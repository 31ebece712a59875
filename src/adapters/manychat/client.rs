//! HTTP client for the messaging platform API
//!
//! One method per endpoint. Each call issues exactly one request and maps the
//! response to an [`Envelope`] or an [`ApiError`]; retrying and rate limiting
//! are the fetcher's job.

use super::models::Envelope;
use crate::config::{ApiConfig, SecretString};
use crate::domain::{ApiError, HarvestError, RemoteId, Result, SubscriberKey};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use std::time::Duration;

const FIND_BY_EMAIL_PATH: &str = "/fb/subscriber/findBySystemField";
const SUBSCRIBER_INFO_PATH: &str = "/fb/subscriber/getInfo";

/// Error bodies are kept for diagnostics, but only this many bytes of them
const MAX_ERROR_BODY: usize = 512;

/// Bearer-authenticated client for the subscriber endpoints
#[derive(Debug, Clone)]
pub struct ManyChatClient {
    base_url: String,
    client: Client,
    api_token: SecretString,
}

impl ManyChatClient {
    /// Build a client from the API configuration
    ///
    /// # Errors
    ///
    /// `Configuration` when the token is missing or the HTTP client cannot be
    /// built.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let api_token = config
            .api_token
            .clone()
            .ok_or_else(|| HarvestError::Configuration("api.api_token is not set".to_string()))?;

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds.min(30)))
            .user_agent(concat!("harvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                HarvestError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            api_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Look up a subscriber by email
    pub async fn find_by_email(
        &self,
        key: &SubscriberKey,
    ) -> std::result::Result<Envelope, ApiError> {
        self.get_envelope(FIND_BY_EMAIL_PATH, &[("email", key.as_str())])
            .await
    }

    /// Fetch the full subscriber record, custom fields included
    pub async fn subscriber_info(
        &self,
        id: &RemoteId,
    ) -> std::result::Result<Envelope, ApiError> {
        self.get_envelope(SUBSCRIBER_INFO_PATH, &[("subscriber_id", id.as_str())])
            .await
    }

    async fn get_envelope(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<Envelope, ApiError> {
        let url = format!("{}{}", self.base_url, path);

        tracing::trace!(url = %url, "Sending request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.api_token.expose_secret().as_ref())
            .query(query)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited { retry_after });
        }

        let body = response.text().await.map_err(classify_reqwest_error)?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<Envelope>(&body) {
                if envelope.is_rate_limited() {
                    return Err(ApiError::RateLimited { retry_after });
                }
            }
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| ApiError::MalformedResponse(format!("{path}: {e}")))?;

        if envelope.is_rate_limited() {
            return Err(ApiError::RateLimited { retry_after });
        }

        Ok(envelope)
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(err.to_string())
    } else if err.is_decode() {
        ApiError::MalformedResponse(err.to_string())
    } else {
        ApiError::Transport(err.to_string())
    }
}

/// `Retry-After` in delta-seconds; HTTP dates and values too large for a
/// `Duration` are ignored
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}
