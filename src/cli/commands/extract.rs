//! Extract command implementation
//!
//! This module implements the `extract` command, which fetches custom fields
//! for every key in the input file and checkpoints the results.

use crate::adapters::input::load_keys;
use crate::adapters::output::{field_columns, write_csv};
use crate::cli::commands::load_settings;
use crate::config::HarvestConfig;
use crate::core::extract::{
    wait_for_shutdown, ExtractionCoordinator, ExtractionSummary, ProgressObserver,
    ProgressSnapshot, RunPhase,
};
use crate::core::state::{CheckpointStore, JsonlCheckpointStore};
use crate::domain::HarvestError;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::watch;

/// Errors shown in the summary table before truncating
const MAX_ERRORS_SHOWN: usize = 20;

/// Arguments for the extract command
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Override the input CSV path
    #[arg(short, long)]
    pub input: Option<String>,

    /// Override the checkpoint path
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// Override requests per rate window
    #[arg(long)]
    pub rps: Option<usize>,

    /// Override the number of concurrent fetches
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Fetch keys that failed in an earlier run again
    #[arg(long)]
    pub retry_failed: bool,

    /// Write the checkpoint to this CSV file when the run ends
    #[arg(short, long)]
    pub output: Option<String>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl ExtractArgs {
    /// Apply command-line overrides to the loaded configuration
    fn apply_overrides(&self, config: &mut HarvestConfig) {
        if let Some(input) = &self.input {
            tracing::info!(input = %input, "Overriding input path from CLI");
            config.extraction.input_path = Some(input.clone());
        }
        if let Some(checkpoint) = &self.checkpoint {
            tracing::info!(checkpoint = %checkpoint, "Overriding checkpoint path from CLI");
            config.extraction.checkpoint_path = checkpoint.clone();
        }
        if let Some(rps) = self.rps {
            tracing::info!(rps, "Overriding request rate from CLI");
            config.extraction.requests_per_second = rps;
        }
        if let Some(concurrency) = self.concurrency {
            tracing::info!(concurrency, "Overriding concurrency from CLI");
            config.extraction.max_concurrency = concurrency;
        }
        if self.retry_failed {
            config.extraction.retry_failed_on_resume = true;
        }
        if let Some(output) = &self.output {
            config.output.csv_path = Some(output.clone());
        }
    }

    /// Execute the extract command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting extract command");

        let mut config = match load_settings(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        self.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let Some(input_path) = config.extraction.input_path.clone() else {
            eprintln!("No input file given. Use --input or set extraction.input_path");
            return Ok(2);
        };

        let loaded = match load_keys(&input_path, &config.extraction.key_column) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(error = %e, input = %input_path, "Failed to load input keys");
                eprintln!("Failed to load input keys: {e}");
                return Ok(2);
            }
        };

        if loaded.keys.is_empty() {
            eprintln!("No keys found in column '{}' of {}", config.extraction.key_column, input_path);
            return Ok(2);
        }

        if !self.yes {
            println!("Extraction Configuration:");
            println!("  Input: {} ({} keys)", input_path, loaded.keys.len());
            println!("  Checkpoint: {}", config.extraction.checkpoint_path);
            println!(
                "  Rate: {} requests / {} ms",
                config.extraction.requests_per_second, config.extraction.rate_window_ms
            );
            println!("  Concurrency: {}", config.extraction.max_concurrency);
            println!("  Fields: {:?}", config.api.fields);
            println!();
            print!("Proceed with extraction? [y/N]: ");
            io::stdout().flush()?;

            match confirm(shutdown_signal.clone(), read_stdin_line).await? {
                Some(true) => {}
                Some(false) => {
                    println!("Extraction cancelled.");
                    return Ok(0);
                }
                None => {
                    println!();
                    println!("Extraction cancelled.");
                    return Ok(130);
                }
            }
        }

        let coordinator = match ExtractionCoordinator::from_config(&config, shutdown_signal) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create extraction coordinator");
                eprintln!("Failed to initialize extraction: {e}");
                return Ok(error_exit_code(&e));
            }
        };

        let progress = (!self.no_progress).then(|| Arc::new(ProgressBarObserver::new()));
        let mut coordinator = match &progress {
            Some(observer) => coordinator.with_observer(observer.clone()),
            None => coordinator,
        };

        println!("🚀 Starting extraction...");
        let result = coordinator.run(loaded.keys).await;

        if let Some(observer) = &progress {
            observer.finish();
        }

        let summary = match (&result, coordinator.summary()) {
            (Ok(summary), _) => summary.clone(),
            (Err(e), Some(summary)) => {
                tracing::error!(error = %e, "Extraction aborted");
                eprintln!("Extraction aborted: {e}");
                summary.clone()
            }
            (Err(e), None) => {
                tracing::error!(error = %e, "Extraction failed");
                eprintln!("Extraction failed: {e}");
                return Ok(error_exit_code(e));
            }
        };

        print_summary(&summary);

        if result.is_ok() {
            if let Some(csv_path) = &config.output.csv_path {
                let store = JsonlCheckpointStore::new(&config.extraction.checkpoint_path);
                let exported = store.records().and_then(|records| {
                    let columns = field_columns(&records, &config.api.fields);
                    write_csv(csv_path, &records, &columns)
                });
                match exported {
                    Ok(rows) => println!("📄 Wrote {rows} records to {csv_path}"),
                    Err(e) => {
                        tracing::error!(error = %e, path = %csv_path, "CSV export failed");
                        eprintln!("CSV export failed: {e}");
                        return Ok(5);
                    }
                }
            }
        }

        Ok(exit_code(&summary))
    }
}

fn read_stdin_line() -> io::Result<String> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}

/// Wait for a y/N answer from `read`, which runs on the blocking pool
///
/// Returns `None` when shutdown is requested before an answer arrives.
async fn confirm<F>(mut shutdown: watch::Receiver<bool>, read: F) -> anyhow::Result<Option<bool>>
where
    F: FnOnce() -> io::Result<String> + Send + 'static,
{
    let answer = tokio::task::spawn_blocking(read);
    tokio::select! {
        biased;
        _ = wait_for_shutdown(&mut shutdown) => Ok(None),
        input = answer => Ok(Some(input??.trim().eq_ignore_ascii_case("y"))),
    }
}

/// Exit code for an error that ended the command before any summary existed
fn error_exit_code(err: &HarvestError) -> i32 {
    match err {
        HarvestError::Validation(_) | HarvestError::Configuration(_) => 2,
        _ => 5,
    }
}

/// Map a finished run to the process exit code
pub fn exit_code(summary: &ExtractionSummary) -> i32 {
    if summary.aborted.is_some() {
        5
    } else if summary.interrupted {
        130
    } else if summary.failed > 0 || summary.deferred > 0 {
        1
    } else {
        0
    }
}

fn print_summary(summary: &ExtractionSummary) {
    println!();
    println!("📊 Extraction Summary:");
    println!("  Run ID: {}", summary.run_id);
    println!(
        "  Started: {}",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Total Processed: {}", summary.total);
    println!("  Success: {}", summary.success);
    println!("  Empty: {}", summary.empty);
    println!("  Failed: {}", summary.failed);
    println!("  Rate Limited (this run): {}", summary.rate_limited);
    println!("  Deferred: {}", summary.deferred);
    println!("  Previously Processed: {}", summary.previously_processed);
    println!("  Processed This Run: {}", summary.processed_this_run);
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!("  Success Rate: {:.2}%", summary.success_rate());
    println!();

    if !summary.errors.is_empty() {
        println!("⚠️  Errors encountered:");
        println!("  {:<40} {:<20} {}", "Email", "Kind", "Message");
        println!("  {}", "-".repeat(90));
        for error in summary.errors.iter().take(MAX_ERRORS_SHOWN) {
            println!(
                "  {:<40} {:<20} {}",
                error.key.as_str(),
                error.kind.to_string(),
                error.message
            );
        }
        if summary.errors.len() > MAX_ERRORS_SHOWN {
            println!(
                "  ... and {} more errors",
                summary.errors.len() - MAX_ERRORS_SHOWN
            );
        }
        println!();
    }

    if let Some(reason) = &summary.aborted {
        println!("❌ Extraction aborted: {reason}");
        println!("   Progress up to the last committed batch is saved.");
    } else if summary.interrupted {
        println!("⚠️  Extraction interrupted gracefully. Progress saved.");
        println!("   Run the same command to resume from checkpoint.");
    } else if summary.deferred > 0 {
        println!(
            "⚠️  {} keys were deferred. Run the same command again to finish them.",
            summary.deferred
        );
    } else if summary.failed > 0 {
        println!("⚠️  Extraction completed with failures");
        println!("   Use --retry-failed to fetch failed keys again.");
    } else {
        println!("✅ Extraction completed successfully!");
    }
}

/// Terminal progress bar fed by checkpoint flushes
struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_phase(&self, phase: RunPhase) {
        if matches!(phase, RunPhase::Draining | RunPhase::Finalizing) {
            self.bar.set_message(phase.to_string());
        }
    }

    fn on_start(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_length(snapshot.total_keys as u64);
        self.bar.set_position(snapshot.settled as u64);
    }

    fn on_flush(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.settled as u64);
        self.bar.set_message(format!(
            "ok {} empty {} failed {}",
            snapshot.counts.success, snapshot.counts.empty, snapshot.counts.failed
        ));
    }
}
