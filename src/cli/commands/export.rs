//! Export command implementation
//!
//! This module implements the `export` command, which writes the latest
//! checkpointed record of every key to a CSV file.

use crate::adapters::output::{field_columns, write_csv};
use crate::cli::commands::{checkpoint_path, load_settings};
use crate::core::state::{CheckpointStore, JsonlCheckpointStore};
use clap::Args;

/// Output path used when neither the flag nor the configuration names one
const DEFAULT_OUTPUT: &str = "harvest_results.csv";

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Checkpoint file to read (defaults to the configured path)
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// CSV file to write (defaults to output.csv_path)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Field columns to include (comma-separated, defaults to api.fields)
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Rewrite the checkpoint with one record per key before exporting
    #[arg(long)]
    pub compact: bool,
}

impl ExportArgs {
    /// Execute the export command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting export command");

        let config = load_settings(config_path).ok();
        let path = checkpoint_path(self.checkpoint.as_deref(), config_path);
        let output = self
            .output
            .clone()
            .or_else(|| config.as_ref().and_then(|c| c.output.csv_path.clone()))
            .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
        let configured_fields = if self.fields.is_empty() {
            config.map(|c| c.api.fields).unwrap_or_default()
        } else {
            self.fields.clone()
        };

        let mut store = JsonlCheckpointStore::new(&path);
        if !store.exists() {
            println!("❌ No checkpoint found at {path}");
            return Ok(2);
        }

        if self.compact {
            match store.compact() {
                Ok(count) => println!("🗜️  Compacted checkpoint to {count} records"),
                Err(e) => {
                    println!("❌ Failed to compact checkpoint");
                    println!("   Error: {e}");
                    return Ok(5);
                }
            }
        }

        let records = match store.records() {
            Ok(records) => records,
            Err(e) => {
                println!("❌ Failed to read checkpoint");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        let columns = field_columns(&records, &configured_fields);
        match write_csv(&output, &records, &columns) {
            Ok(rows) => {
                println!("✅ Wrote {rows} records to {output}");
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write CSV");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}
