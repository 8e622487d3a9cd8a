//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ResilienceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ResilienceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = load_config_str(&content)?;

    tracing::debug!(path = %path.display(), overrides = config.operations.len(), "Configuration loaded");
    Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn load_config_str(content: &str) -> Result<ResilienceConfig, ConfigError> {
    let config: ResilienceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
resource_type = "family"
default_timeout_ms = 2000

[circuit_breaker]
error_threshold = 0.25
volume_threshold = 4
sleep_window_ms = 250

[rate_limit]
enabled = true
requests_per_second = 10
burst_size = 3

[retries]
max_retries = 5

[[operations]]
name = "families.search"

[operations.retries]
max_retries = 1
"#;

    #[test]
    fn test_parse_sample() {
        let config = load_config_str(SAMPLE).unwrap();
        assert_eq!(config.resource_type, "family");
        assert_eq!(config.circuit_breaker.volume_threshold, 4);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.circuit_breaker.window_ms, 10_000);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.retries.max_retries, 5);
        assert_eq!(config.retries.initial_backoff_ms, 100);

        let search = config.for_operation("families.search");
        assert_eq!(search.retries.max_retries, 1);
    }

    #[test]
    fn test_fractional_rate() {
        let config = load_config_str("[rate_limit]\nenabled = true\nrequests_per_second = 0.5\n").unwrap();
        assert_eq!(config.rate_limit.requests_per_second, 0.5);
        assert_eq!(config.rate_limit.burst_size, 50);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = load_config_str("").unwrap();
        assert_eq!(config.resource_type, "repository");
    }

    #[test]
    fn test_parse_error() {
        let err = load_config_str("[circuit_breaker\nenabled = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_error() {
        let err = load_config_str("[retries]\ninitial_backoff_ms = 9000\nmax_backoff_ms = 10\n")
            .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("resilience_core_loader_test.toml");
        fs::write(&path, SAMPLE).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.default_timeout_ms, 2000);

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
