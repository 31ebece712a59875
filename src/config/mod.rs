//! Configuration management for Harvest.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Harvest uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `HARVEST_*` environment overrides
//! - `MANYCHAT_API_TOKEN` as a fallback for the API token
//! - Default values for every optional setting
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use harvest::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("harvest.toml")?;
//!
//! println!("API: {}", config.api.base_url);
//! println!("Rate: {}/window", config.extraction.requests_per_second);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level
//! - [`ApiConfig`] - Endpoint, token, field selection and [`RetryConfig`]
//! - [`ExtractionConfig`] - Input, checkpoint, rate limit, concurrency and batching
//! - [`OutputConfig`] - CSV export target
//! - [`LoggingConfig`] - Local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [api]
//! api_token = "${MANYCHAT_API_TOKEN}"
//! fields = ["shopify_domain", "telephone"]
//!
//! [extraction]
//! input_path = "subscribers.csv"
//! checkpoint_path = "harvest_checkpoint.jsonl"
//! requests_per_second = 10
//! batch_size = 10
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, load_from_env};
pub use schema::{
    ApiConfig, ApplicationConfig, ExtractionConfig, HarvestConfig, LoggingConfig, OutputConfig,
    RetryConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
