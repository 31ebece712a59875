//! Integration tests for logging functionality
//!
//! A test binary can install only one global subscriber, so a single test
//! initializes file logging and checks everything that depends on it.

use harvest::config::LoggingConfig;
use harvest::logging::init_logging;
use harvest::{log_batch_flush, log_extraction_start, log_retry_attempt};
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(config.local_enabled);
    assert_eq!(config.local_path, "logs");
    assert_eq!(config.local_rotation, "daily");
}

#[test]
fn test_invalid_level_is_rejected_before_install() {
    let config = LoggingConfig {
        local_enabled: false,
        local_path: String::new(),
        local_rotation: "daily".to_string(),
    };
    let err = init_logging("chatty", &config).err().unwrap();
    assert!(err.to_string().contains("Invalid log level"));
}

#[test]
fn test_file_logging_writes_json_events() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("nested").join("logs");

    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().into_owned(),
        local_rotation: "never".to_string(),
    };

    // Events from this test binary are outside the default `harvest` target filter
    std::env::set_var("RUST_LOG", "debug");
    let guard = init_logging("debug", &config).unwrap();
    assert!(guard.has_file_output());
    assert!(log_path.exists());

    log_extraction_start!("run-42", 3, 2);
    log_batch_flush!(1u64, 2usize, 2usize, 3usize);
    log_retry_attempt!(1, 3, "connection reset");

    // Dropping the guard flushes the background writer
    drop(guard);

    let contents = std::fs::read_to_string(log_path.join("harvest.log")).unwrap();
    let events: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let start = events
        .iter()
        .find(|e| e["fields"]["message"] == "Starting extraction")
        .unwrap();
    assert_eq!(start["fields"]["run_id"], "run-42");
    assert_eq!(start["fields"]["total_keys"], 3);

    let flush = events
        .iter()
        .find(|e| e["fields"]["message"] == "Checkpoint batch committed")
        .unwrap();
    assert_eq!(flush["fields"]["batch_id"], 1);
    assert_eq!(flush["level"], "DEBUG");

    let retry = events
        .iter()
        .find(|e| e["fields"]["message"] == "Retrying request")
        .unwrap();
    assert_eq!(retry["fields"]["reason"], "connection reset");
}
