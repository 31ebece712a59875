// Harvest - Rate-limited, resumable subscriber field extractor
// Copyright (c) 2025 Harvest Contributors
// Licensed under the MIT License

use harvest::cli::{Cli, Commands};
use harvest::config::{load_config, LoggingConfig};
use harvest::log_error_with_context;
use harvest::logging::init_logging;
use clap::Parser;
use std::process;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (log_level, logging_config) = logging_settings(&cli);
    let _logging_guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(5);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Harvest - subscriber field extractor"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_signal().await;
        eprintln!("\n⚠️  Shutdown signal received, finishing in-flight requests...");
        let _ = shutdown_tx.send(true);
    });

    let exit_code = match execute_command(&cli, shutdown_rx).await {
        Ok(code) => code,
        Err(e) => {
            log_error_with_context!(e, "Command execution failed");
            eprintln!("Error: {e}");
            5
        }
    };

    drop(_logging_guard);
    process::exit(exit_code);
}

/// Log level and file logging for this invocation
///
/// Only `extract` writes log files; the other commands log to the console.
fn logging_settings(cli: &Cli) -> (String, LoggingConfig) {
    let console_only = LoggingConfig {
        local_enabled: false,
        local_path: String::new(),
        local_rotation: "daily".to_string(),
    };

    let config = match &cli.command {
        Commands::Extract(_) => load_config(&cli.config).ok(),
        _ => None,
    };

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().map(|c| c.application.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());

    let logging = config.map(|c| c.logging).unwrap_or(console_only);
    (log_level, logging)
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    }
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl+C only");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, shutdown_signal: watch::Receiver<bool>) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Extract(args) => args.execute(&cli.config, shutdown_signal).await,
        Commands::Status(args) => args.execute(&cli.config).await,
        Commands::Export(args) => args.execute(&cli.config).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    }
}
