//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Harvest configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates, including the API token
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  API: {}", config.api.base_url);
        println!("  API Token: set");
        println!("  Fields: {:?}", config.api.fields);
        println!(
            "  Input: {}",
            config.extraction.input_path.as_deref().unwrap_or("(none, use --input)")
        );
        println!("  Key Column: {}", config.extraction.key_column);
        println!("  Checkpoint: {}", config.extraction.checkpoint_path);
        println!(
            "  Rate: {} requests / {} ms",
            config.extraction.requests_per_second, config.extraction.rate_window_ms
        );
        println!("  Concurrency: {}", config.extraction.max_concurrency);
        println!("  Batch Size: {}", config.extraction.batch_size);
        println!(
            "  Retry Failed On Resume: {}",
            config.extraction.retry_failed_on_resume
        );
        if let Some(csv_path) = &config.output.csv_path {
            println!("  CSV Output: {csv_path}");
        }
        println!();
        Ok(0)
    }
}
