//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Harvest using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Harvest - rate-limited, resumable subscriber field extractor
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version, about, long_about = None)]
#[command(author = "Harvest Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "harvest.toml", env = "HARVEST_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "HARVEST_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch custom fields for every key in the input file
    Extract(commands::extract::ExtractArgs),

    /// Show checkpoint progress
    Status(commands::status::StatusArgs),

    /// Write checkpointed records to CSV
    Export(commands::export::ExportArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
