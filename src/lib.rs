// Harvest - Rate-limited, resumable subscriber field extractor
// Copyright (c) 2025 Harvest Contributors
// Licensed under the MIT License

//! # Harvest - subscriber custom field extraction
//!
//! Harvest pulls per-subscriber custom fields from a messaging platform's HTTP
//! API for a large list of email addresses. Requests are throttled to a fixed
//! rate, run with bounded concurrency and checkpointed in batches, so a long
//! extraction can be interrupted and resumed without redoing finished keys.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Rate limiter, run state, checkpoint and the extraction coordinator
//! - [`adapters`] - Remote API client and fetcher, CSV input and output
//! - [`domain`] - Keys, fetch outcomes, records and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harvest::adapters::input::load_keys;
//! use harvest::config::load_config;
//! use harvest::core::extract::ExtractionCoordinator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("harvest.toml")?;
//!     let keys = load_keys("subscribers.csv", &config.extraction.key_column)?.keys;
//!
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let mut coordinator = ExtractionCoordinator::from_config(&config, shutdown_rx)?;
//!
//!     let summary = coordinator.run(keys).await?;
//!     println!("{} of {} keys had data", summary.success, summary.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Resuming
//!
//! Every committed batch is one line in a JSON Lines checkpoint. Running the
//! same extraction again loads the checkpoint and only fetches keys without
//! a committed outcome:
//!
//! ```rust,no_run
//! use harvest::core::state::{CheckpointStore, JsonlCheckpointStore};
//! use harvest::domain::SubscriberKey;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = JsonlCheckpointStore::new("harvest_checkpoint.jsonl");
//! let state = store.load()?;
//!
//! let keys = vec![SubscriberKey::new("someone@example.com")?];
//! let pending = state.pending(&keys, false);
//! println!("{} keys left", pending.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Rate Limiting
//!
//! One [`RateLimiter`](core::rate_limit::RateLimiter) is shared by every
//! request, so no more than the configured number of requests start in any
//! rolling window:
//!
//! ```rust
//! use harvest::core::rate_limit::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::per_second(10);
//! limiter.acquire().await;
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Library functions return [`domain::Result`], with [`domain::HarvestError`]
//! for run-level failures. Per-key failures never surface as errors; they are
//! classified into a [`domain::FetchOutcome`] and recorded.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
