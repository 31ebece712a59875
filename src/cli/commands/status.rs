//! Status command implementation
//!
//! This module implements the `status` command for summarizing a checkpoint.

use crate::adapters::input::load_keys;
use crate::cli::commands::{checkpoint_path, load_settings};
use crate::core::state::{CheckpointStore, JsonlCheckpointStore};
use crate::domain::HarvestError;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Checkpoint file to inspect (defaults to the configured path)
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// Input CSV to count pending keys against
    #[arg(short, long)]
    pub input: Option<String>,

    /// Key column of the input CSV
    #[arg(long, default_value = "email")]
    pub key_column: String,

    /// Count failed keys as pending
    #[arg(long)]
    pub retry_failed: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking extraction status");

        println!("📊 Extraction Status");
        println!();

        let path = checkpoint_path(self.checkpoint.as_deref(), config_path);
        let mut store = JsonlCheckpointStore::new(&path);

        if !store.exists() {
            println!("No checkpoint found at {path}.");
            println!("Run 'harvest extract' to start extracting data.");
            return Ok(0);
        }

        let state = match store.load() {
            Ok(state) => state,
            Err(HarvestError::CorruptState(reason)) => {
                println!("❌ Checkpoint is corrupt: {reason}");
                println!("   The next extract run moves it aside and starts fresh.");
                return Ok(5);
            }
            Err(e) => {
                println!("❌ Failed to read checkpoint");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        let last_processed = store
            .records()
            .ok()
            .and_then(|records| records.iter().map(|r| r.processed_at).max());

        let counts = state.counts();
        println!("Checkpoint: {path}");
        println!();
        println!("{:<12} {:>10}", "Outcome", "Keys");
        println!("{}", "-".repeat(23));
        println!("{:<12} {:>10}", "success", counts.success);
        println!("{:<12} {:>10}", "empty", counts.empty);
        println!("{:<12} {:>10}", "failed", counts.failed);
        println!("{}", "-".repeat(23));
        println!("{:<12} {:>10}", "total", counts.total);
        println!();
        println!(
            "Last processed: {}",
            last_processed
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Never".to_string())
        );

        let input = self.input.clone().or_else(|| {
            load_settings(config_path)
                .ok()
                .and_then(|config| config.extraction.input_path)
        });

        if let Some(input) = input {
            match load_keys(&input, &self.key_column) {
                Ok(loaded) => {
                    let pending = state.pending(&loaded.keys, self.retry_failed);
                    println!(
                        "Pending: {} of {} input keys ({})",
                        pending.len(),
                        loaded.keys.len(),
                        input
                    );
                }
                Err(e) => {
                    println!("❌ Failed to read input file");
                    println!("   Error: {e}");
                    return Ok(2);
                }
            }
        }

        println!();
        Ok(0)
    }
}
