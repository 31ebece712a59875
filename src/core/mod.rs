//! Core business logic for Harvest.
//!
//! # Modules
//!
//! - [`extract`] - Run orchestration, outcome buffering and summaries
//! - [`rate_limit`] - Sliding-window limiter shared by every request start
//! - [`state`] - Run state and the JSON Lines checkpoint
//!
//! # Extraction Workflow
//!
//! 1. **Load State**: Rebuild processed keys from the checkpoint
//! 2. **Plan**: Skip keys the checkpoint already settled
//! 3. **Fetch**: Look up each key and read its custom fields, rate limited
//! 4. **Checkpoint**: Append finished outcomes in batches
//! 5. **Report**: Build the run summary
//!
//! # Example
//!
//! ```rust,no_run
//! use harvest::config::load_config;
//! use harvest::core::extract::ExtractionCoordinator;
//! use harvest::domain::SubscriberKey;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("harvest.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let mut coordinator = ExtractionCoordinator::from_config(&config, shutdown_rx)?;
//! let summary = coordinator
//!     .run(vec![SubscriberKey::new("someone@example.com")?])
//!     .await?;
//!
//! println!("Success: {}", summary.success);
//! println!("Empty: {}", summary.empty);
//! println!("Failed: {}", summary.failed);
//! # Ok(())
//! # }
//! ```

pub mod extract;
pub mod rate_limit;
pub mod state;
