//! Configuration schema types
//!
//! This module defines the configuration structure for Harvest. Every section
//! has defaults so that a minimal file only needs the API token.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};

/// Main Harvest configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarvestConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Messaging platform API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Extraction engine settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// CSV materialization settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HarvestConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.api.validate()?;
        self.extraction.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Retry configuration for API requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retries for transport errors, timeouts and 5xx responses
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Maximum retries after a rate-limit signal before the key is failed
    #[serde(default = "default_rate_limit_max_retries")]
    pub rate_limit_max_retries: u32,

    /// Wait used when a rate-limited response carries no Retry-After hint
    #[serde(default = "default_rate_limit_fallback_ms")]
    pub rate_limit_fallback_ms: u64,

    /// Longest cooldown honored from a server Retry-After hint
    #[serde(default = "default_rate_limit_max_wait_ms")]
    pub rate_limit_max_wait_ms: u64,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_retries > 10 {
            return Err(format!(
                "api.retry.max_retries must be <= 10, got {}",
                self.max_retries
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(format!(
                "api.retry.backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "api.retry.initial_delay_ms ({}) cannot exceed max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            ));
        }
        if self.rate_limit_max_retries > 20 {
            return Err(format!(
                "api.retry.rate_limit_max_retries must be <= 20, got {}",
                self.rate_limit_max_retries
            ));
        }
        if self.rate_limit_max_wait_ms == 0 {
            return Err("api.retry.rate_limit_max_wait_ms must be greater than 0".to_string());
        }
        if self.rate_limit_fallback_ms > self.rate_limit_max_wait_ms {
            return Err(format!(
                "api.retry.rate_limit_fallback_ms ({}) cannot exceed rate_limit_max_wait_ms ({})",
                self.rate_limit_fallback_ms, self.rate_limit_max_wait_ms
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            rate_limit_max_retries: default_rate_limit_max_retries(),
            rate_limit_fallback_ms: default_rate_limit_fallback_ms(),
            rate_limit_max_wait_ms: default_rate_limit_max_wait_ms(),
        }
    }
}

/// Messaging platform API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub api_token: Option<SecretString>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Custom field names to extract (empty = every field)
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ApiConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if self.base_url.is_empty() {
            return Err("api.base_url cannot be empty".to_string());
        }

        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| format!("api.base_url is not a valid URL: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
            return Err("api.base_url must be an http:// or https:// URL".to_string());
        }

        match &self.api_token {
            Some(token) if !token.expose_secret().is_empty() => {}
            _ => {
                return Err(
                    "api.api_token is required (set it in the file, HARVEST_API_TOKEN or MANYCHAT_API_TOKEN)"
                        .to_string(),
                )
            }
        }

        if self.timeout_seconds == 0 {
            return Err("api.timeout_seconds must be > 0".to_string());
        }

        if self.fields.iter().any(|f| f.trim().is_empty()) {
            return Err("api.fields cannot contain empty names".to_string());
        }

        self.retry.validate()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            timeout_seconds: default_timeout_seconds(),
            fields: default_fields(),
            retry: RetryConfig::default(),
        }
    }
}

/// Extraction engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Input CSV file (can be given on the command line instead)
    #[serde(default)]
    pub input_path: Option<String>,

    /// Name of the CSV column holding the subscriber key
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Checkpoint file (JSON Lines)
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,

    /// Request starts allowed per rate window
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: usize,

    /// Rate window length in milliseconds
    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,

    /// Maximum fetches in flight
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Records buffered before a checkpoint flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush the buffer at least this often
    #[serde(default = "default_flush_interval_seconds")]
    pub flush_interval_seconds: u64,

    /// Graceful shutdown timeout in seconds
    /// This is the maximum time to wait for in-flight fetches after an
    /// interrupt before they are abandoned (they stay pending).
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// How many times a key that came back rate limited is re-queued
    #[serde(default = "default_max_requeues")]
    pub max_requeues: u32,

    /// Fetch keys whose checkpointed outcome is `failed` again
    #[serde(default)]
    pub retry_failed_on_resume: bool,
}

impl ExtractionConfig {
    fn validate(&self) -> Result<(), String> {
        if self.key_column.trim().is_empty() {
            return Err("extraction.key_column cannot be empty".to_string());
        }

        if self.checkpoint_path.trim().is_empty() {
            return Err("extraction.checkpoint_path cannot be empty".to_string());
        }

        if self.requests_per_second == 0 || self.requests_per_second > 1000 {
            return Err(format!(
                "extraction.requests_per_second must be between 1 and 1000, got {}",
                self.requests_per_second
            ));
        }

        if self.rate_window_ms == 0 {
            return Err("extraction.rate_window_ms must be > 0".to_string());
        }

        if self.max_concurrency == 0 || self.max_concurrency > 100 {
            return Err(format!(
                "extraction.max_concurrency must be between 1 and 100, got {}",
                self.max_concurrency
            ));
        }

        if !(1..=10_000).contains(&self.batch_size) {
            return Err(format!(
                "extraction.batch_size must be between 1 and 10000, got {}",
                self.batch_size
            ));
        }

        if self.flush_interval_seconds == 0 {
            return Err("extraction.flush_interval_seconds must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            key_column: default_key_column(),
            checkpoint_path: default_checkpoint_path(),
            requests_per_second: default_requests_per_second(),
            rate_window_ms: default_rate_window_ms(),
            max_concurrency: default_max_concurrency(),
            batch_size: default_batch_size(),
            flush_interval_seconds: default_flush_interval_seconds(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            max_requeues: default_max_requeues(),
            retry_failed_on_resume: false,
        }
    }
}

/// CSV output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// CSV file written by `harvest export` (default: timestamped name)
    #[serde(default)]
    pub csv_path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy (daily, hourly or never)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".into());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.manychat.com".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_fields() -> Vec<String> {
    vec!["shopify_domain".to_string(), "telephone".to_string()]
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_rate_limit_max_retries() -> u32 {
    5
}

fn default_rate_limit_fallback_ms() -> u64 {
    1000
}

fn default_rate_limit_max_wait_ms() -> u64 {
    60_000
}

fn default_key_column() -> String {
    "email".to_string()
}

fn default_checkpoint_path() -> String {
    "harvest_checkpoint.jsonl".to_string()
}

fn default_requests_per_second() -> usize {
    10
}

fn default_rate_window_ms() -> u64 {
    1000
}

fn default_max_concurrency() -> usize {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval_seconds() -> u64 {
    5
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_max_requeues() -> u32 {
    3
}

fn default_local_path() -> String {
    "logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
