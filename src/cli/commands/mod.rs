//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod export;
pub mod extract;
pub mod init;
pub mod status;
pub mod validate;

use crate::config::{load_config, load_from_env, HarvestConfig};
use crate::domain::Result;
use std::path::Path;

/// Load the configuration file, or build one from the environment when the
/// file does not exist
pub(crate) fn load_settings(config_path: &str) -> Result<HarvestConfig> {
    if Path::new(config_path).exists() {
        load_config(config_path)
    } else {
        tracing::info!(
            config_path = %config_path,
            "Configuration file not found, using defaults and environment"
        );
        load_from_env()
    }
}

/// Checkpoint path from an explicit flag, the configuration, or the default
///
/// Reading a checkpoint does not need an API token, so a configuration that
/// fails to load only costs the configured path.
pub(crate) fn checkpoint_path(explicit: Option<&str>, config_path: &str) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }
    match load_settings(config_path) {
        Ok(config) => config.extraction.checkpoint_path,
        Err(e) => {
            tracing::debug!(error = %e, "Using default checkpoint path");
            crate::config::ExtractionConfig::default().checkpoint_path
        }
    }
}
