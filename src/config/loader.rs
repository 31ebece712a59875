//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::HarvestConfig;
use super::secret::secret_string;
use crate::domain::errors::HarvestError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Fallback variable for the API token, honored when nothing else sets it
pub const TOKEN_FALLBACK_VAR: &str = "MANYCHAT_API_TOKEN";

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into HarvestConfig
/// 4. Applies environment variable overrides (HARVEST_* prefix)
/// 5. Falls back to `MANYCHAT_API_TOKEN` when no token is configured
/// 6. Validates the configuration
///
/// # Errors
///
/// Returns a `Configuration` error if the file cannot be read or parsed, a
/// referenced variable is unset, an override has the wrong type, or
/// validation fails.
///
/// # Examples
///
/// ```no_run
/// use harvest::config::loader::load_config;
///
/// let config = load_config("harvest.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<HarvestConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(HarvestError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        HarvestError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut config = parse_config(&contents)?;
    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        HarvestError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Builds a configuration purely from defaults and the environment
///
/// Used when no configuration file exists, so `MANYCHAT_API_TOKEN` alone is
/// enough to run an extraction.
///
/// # Errors
///
/// Returns a `Configuration` error if an override is malformed or the result
/// does not validate.
pub fn load_from_env() -> Result<HarvestConfig> {
    let mut config = HarvestConfig::default();
    apply_env_overrides(&mut config)?;
    config.validate().map_err(|e| {
        HarvestError::Configuration(format!("Configuration validation failed: {e}"))
    })?;
    Ok(config)
}

/// Substitutes `${VAR}` placeholders and parses the TOML document
pub(crate) fn parse_config(contents: &str) -> Result<HarvestConfig> {
    let contents = substitute_env_vars(contents)?;
    toml::from_str(&contents)
        .map_err(|e| HarvestError::Configuration(format!("Failed to parse TOML: {e}")))
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| HarvestError::Configuration(format!("Invalid placeholder pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|m| m == name) {
                        missing_vars.push(name.to_string());
                    }
                    String::new()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(HarvestError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the HARVEST_* prefix
///
/// Environment variables follow the pattern: HARVEST_<SECTION>_<KEY>, for
/// example HARVEST_EXTRACTION_BATCH_SIZE. `HARVEST_API_TOKEN` sets the token
/// directly.
fn apply_env_overrides(config: &mut HarvestConfig) -> Result<()> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

fn parse_override<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        HarvestError::Configuration(format!("Invalid value '{value}' for {name}"))
    })
}

fn apply_overrides_from<F>(config: &mut HarvestConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    macro_rules! set_string {
        ($var:literal, $field:expr) => {
            if let Some(val) = lookup($var) {
                $field = val;
            }
        };
    }
    macro_rules! set_parsed {
        ($var:literal, $field:expr) => {
            if let Some(val) = lookup($var) {
                $field = parse_override($var, &val)?;
            }
        };
    }

    // Application overrides
    set_string!("HARVEST_APPLICATION_LOG_LEVEL", config.application.log_level);

    // API overrides
    set_string!("HARVEST_API_BASE_URL", config.api.base_url);
    set_parsed!("HARVEST_API_TIMEOUT_SECONDS", config.api.timeout_seconds);
    if let Some(val) = lookup("HARVEST_API_FIELDS") {
        config.api.fields = val
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect();
    }
    set_parsed!("HARVEST_API_RETRY_MAX_RETRIES", config.api.retry.max_retries);
    set_parsed!(
        "HARVEST_API_RETRY_RATE_LIMIT_MAX_RETRIES",
        config.api.retry.rate_limit_max_retries
    );
    set_parsed!(
        "HARVEST_API_RETRY_RATE_LIMIT_MAX_WAIT_MS",
        config.api.retry.rate_limit_max_wait_ms
    );

    // Extraction overrides
    if let Some(val) = lookup("HARVEST_EXTRACTION_INPUT_PATH") {
        config.extraction.input_path = Some(val);
    }
    set_string!("HARVEST_EXTRACTION_KEY_COLUMN", config.extraction.key_column);
    set_string!(
        "HARVEST_EXTRACTION_CHECKPOINT_PATH",
        config.extraction.checkpoint_path
    );
    set_parsed!(
        "HARVEST_EXTRACTION_REQUESTS_PER_SECOND",
        config.extraction.requests_per_second
    );
    set_parsed!(
        "HARVEST_EXTRACTION_MAX_CONCURRENCY",
        config.extraction.max_concurrency
    );
    set_parsed!("HARVEST_EXTRACTION_BATCH_SIZE", config.extraction.batch_size);
    set_parsed!(
        "HARVEST_EXTRACTION_FLUSH_INTERVAL_SECONDS",
        config.extraction.flush_interval_seconds
    );
    set_parsed!(
        "HARVEST_EXTRACTION_SHUTDOWN_TIMEOUT_SECS",
        config.extraction.shutdown_timeout_secs
    );
    set_parsed!(
        "HARVEST_EXTRACTION_RETRY_FAILED_ON_RESUME",
        config.extraction.retry_failed_on_resume
    );

    // Output overrides
    if let Some(val) = lookup("HARVEST_OUTPUT_CSV_PATH") {
        config.output.csv_path = Some(val);
    }

    // Logging overrides
    set_parsed!("HARVEST_LOGGING_LOCAL_ENABLED", config.logging.local_enabled);
    set_string!("HARVEST_LOGGING_LOCAL_PATH", config.logging.local_path);

    // Token: explicit override first, then the platform's conventional variable
    if let Some(token) = lookup("HARVEST_API_TOKEN") {
        config.api.api_token = Some(secret_string(token));
    } else if config.api.api_token.is_none() {
        if let Some(token) = lookup(TOKEN_FALLBACK_VAR) {
            config.api.api_token = Some(secret_string(token));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("HARVEST_LOADER_TEST_VAR", "test_value");
        let input = "api_token = \"${HARVEST_LOADER_TEST_VAR}\"\n# ${NOT_SUBSTITUTED}";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(
            result,
            "api_token = \"test_value\"\n# ${NOT_SUBSTITUTED}\n"
        );
        std::env::remove_var("HARVEST_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        let input = "api_token = \"${HARVEST_LOADER_SURELY_MISSING}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("HARVEST_LOADER_SURELY_MISSING"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-harvest.toml");
        assert!(matches!(result, Err(HarvestError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"

[api]
api_token = "file-token"
fields = ["shopify_domain"]

[extraction]
requests_per_second = 5
checkpoint_path = "run.jsonl"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.api.fields, vec!["shopify_domain"]);
        assert_eq!(config.extraction.requests_per_second, 5);
        assert_eq!(config.extraction.checkpoint_path, "run.jsonl");
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = HarvestConfig::default();
        let lookup = lookup_from(&[
            ("HARVEST_EXTRACTION_BATCH_SIZE", "25"),
            ("HARVEST_API_FIELDS", "telephone, city"),
            ("HARVEST_EXTRACTION_RETRY_FAILED_ON_RESUME", "true"),
        ]);
        apply_overrides_from(&mut config, lookup).unwrap();

        assert_eq!(config.extraction.batch_size, 25);
        assert_eq!(config.api.fields, vec!["telephone", "city"]);
        assert!(config.extraction.retry_failed_on_resume);
    }

    #[test]
    fn test_invalid_numeric_override_is_rejected() {
        let mut config = HarvestConfig::default();
        let lookup = lookup_from(&[("HARVEST_EXTRACTION_MAX_CONCURRENCY", "lots")]);
        let err = apply_overrides_from(&mut config, lookup).unwrap_err();
        assert!(err.to_string().contains("HARVEST_EXTRACTION_MAX_CONCURRENCY"));
    }

    #[test]
    fn test_token_fallback_only_when_unset() {
        let mut config = HarvestConfig::default();
        apply_overrides_from(&mut config, lookup_from(&[(TOKEN_FALLBACK_VAR, "fallback")]))
            .unwrap();
        assert_eq!(
            config.api.api_token.as_ref().unwrap().expose_secret().as_ref(),
            "fallback"
        );

        let mut config = HarvestConfig::default();
        config.api.api_token = Some(secret_string("from-file".to_string()));
        apply_overrides_from(&mut config, lookup_from(&[(TOKEN_FALLBACK_VAR, "fallback")]))
            .unwrap();
        assert_eq!(
            config.api.api_token.as_ref().unwrap().expose_secret().as_ref(),
            "from-file"
        );
    }

    #[test]
    fn test_explicit_token_override_wins() {
        let mut config = HarvestConfig::default();
        config.api.api_token = Some(secret_string("from-file".to_string()));
        let lookup = lookup_from(&[
            ("HARVEST_API_TOKEN", "explicit"),
            (TOKEN_FALLBACK_VAR, "fallback"),
        ]);
        apply_overrides_from(&mut config, lookup).unwrap();
        assert_eq!(
            config.api.api_token.as_ref().unwrap().expose_secret().as_ref(),
            "explicit"
        );
    }
}
