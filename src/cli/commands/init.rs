//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "harvest.toml")]
    pub output: String,

    /// Include every setting with comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing Harvest configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. Export MANYCHAT_API_TOKEN or add it to a .env file");
                println!("  3. Validate configuration: harvest validate-config");
                println!("  4. Run extraction: harvest extract --input subscribers.csv");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# Harvest Configuration File
# The API token is read from MANYCHAT_API_TOKEN unless set below.

[application]
log_level = "info"

[api]
# api_token = "${MANYCHAT_API_TOKEN}"
fields = ["shopify_domain", "telephone"]

[extraction]
input_path = "subscribers.csv"
checkpoint_path = "harvest_checkpoint.jsonl"
requests_per_second = 10
max_concurrency = 5

[output]
csv_path = "harvest_results.csv"
"#
        .to_string()
    }

    /// Generate configuration with every setting documented
    fn generate_config_with_examples() -> String {
        r#"# Harvest Configuration File
# Rate-limited, resumable subscriber field extraction
#
# Values support ${VAR} substitution from the environment, and every setting
# can be overridden with HARVEST_<SECTION>_<KEY>, for example
# HARVEST_EXTRACTION_BATCH_SIZE=25.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level: trace | debug | info | warn | error
log_level = "info"

# ============================================================================
# API Configuration
# ============================================================================
[api]
# Base URL of the subscriber API
base_url = "https://api.manychat.com"

# Bearer token. Falls back to HARVEST_API_TOKEN, then MANYCHAT_API_TOKEN.
# api_token = "${MANYCHAT_API_TOKEN}"

# Per-request timeout in seconds
timeout_seconds = 30

# Custom fields to extract. An empty list extracts every field.
fields = ["shopify_domain", "telephone"]

[api.retry]
# Retries for transport errors, timeouts, 408 and 5xx responses
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

# Retries after a rate-limit response before the key is marked failed
rate_limit_max_retries = 5

# Wait used when a rate-limit response has no Retry-After header
rate_limit_fallback_ms = 1000

# Ceiling on a server-provided Retry-After wait
rate_limit_max_wait_ms = 60000

# ============================================================================
# Extraction Configuration
# ============================================================================
[extraction]
# CSV file with one key per row
input_path = "subscribers.csv"

# Header of the key column (matched case-insensitively)
key_column = "email"

# JSON Lines checkpoint. Re-running with the same file resumes the run.
checkpoint_path = "harvest_checkpoint.jsonl"

# At most this many requests start within any rate window
requests_per_second = 10
rate_window_ms = 1000

# Keys fetched concurrently
max_concurrency = 5

# Records per checkpoint write, and the longest time between writes
batch_size = 10
flush_interval_seconds = 5

# How long an interrupted run waits for in-flight fetches
shutdown_timeout_secs = 30

# Times a rate-limited key is re-queued before it is left for the next run
max_requeues = 3

# Fetch keys that failed in an earlier run again
retry_failed_on_resume = false

# ============================================================================
# Output Configuration
# ============================================================================
[output]
# Written from the checkpoint after every completed extract run
csv_path = "harvest_results.csv"

# ============================================================================
# Logging Configuration
# ============================================================================
[logging]
# JSON log files next to the console output
local_enabled = true
local_path = "logs"

# Log rotation: daily | hourly | never
local_rotation = "daily"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;
    use tempfile::TempDir;

    #[test]
    fn test_init_args_defaults() {
        let args = InitArgs {
            output: "harvest.toml".to_string(),
            with_examples: false,
            force: false,
        };

        assert_eq!(args.output, "harvest.toml");
        assert!(!args.with_examples);
        assert!(!args.force);
    }

    #[test]
    fn test_generated_configs_parse() {
        for content in [
            InitArgs::generate_minimal_config(),
            InitArgs::generate_config_with_examples(),
        ] {
            let config = parse_config(&content).unwrap();
            assert_eq!(config.extraction.key_column, "email");
            assert_eq!(config.api.fields, vec!["shopify_domain", "telephone"]);
        }
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("harvest.toml");
        std::fs::write(&path, "# existing").unwrap();

        let args = InitArgs {
            output: path.to_string_lossy().into_owned(),
            with_examples: false,
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# existing");

        let args = InitArgs { force: true, ..args };
        assert_eq!(args.execute().await.unwrap(), 0);
        assert!(std::fs::read_to_string(&path).unwrap().contains("[extraction]"));
    }
}
