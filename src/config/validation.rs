//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds within 0.0-1.0, rates > 0 when enabled)
//! - Detect duplicate operation overrides
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::{
    CircuitBreakerConfig, RateLimitConfig, ResilienceConfig, RetryConfig,
};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check `config` and return every problem found.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.resource_type.trim().is_empty() {
        errors.push(ValidationError::new("resource_type", "must not be empty"));
    }

    validate_circuit_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);
    validate_rate_limit("rate_limit", &config.rate_limit, &mut errors);
    validate_retries("retries", &config.retries, &mut errors);

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}', expected 'pretty' or 'json'", other),
        )),
    }

    let mut seen = HashSet::new();
    for (i, op) in config.operations.iter().enumerate() {
        let prefix = format!("operations[{}]", i);
        if op.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", prefix), "must not be empty"));
        } else if !seen.insert(op.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", prefix),
                format!("duplicate override for '{}'", op.name),
            ));
        }
        if let Some(cb) = &op.circuit_breaker {
            validate_circuit_breaker(&format!("{}.circuit_breaker", prefix), cb, &mut errors);
        }
        if let Some(rl) = &op.rate_limit {
            validate_rate_limit(&format!("{}.rate_limit", prefix), rl, &mut errors);
        }
        if let Some(retries) = &op.retries {
            validate_retries(&format!("{}.retries", prefix), retries, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_circuit_breaker(prefix: &str, cb: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if !(0.0..=1.0).contains(&cb.error_threshold) {
        errors.push(ValidationError::new(
            format!("{}.error_threshold", prefix),
            format!("{} is outside 0.0-1.0", cb.error_threshold),
        ));
    }
    if cb.enabled && cb.volume_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{}.volume_threshold", prefix),
            "must be at least 1",
        ));
    }
}

fn validate_rate_limit(prefix: &str, rl: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if !rl.enabled {
        return;
    }
    if !(rl.requests_per_second.is_finite() && rl.requests_per_second > 0.0) {
        errors.push(ValidationError::new(
            format!("{}.requests_per_second", prefix),
            "must be greater than 0 when enabled",
        ));
    }
    if rl.burst_size == 0 {
        errors.push(ValidationError::new(
            format!("{}.burst_size", prefix),
            "must be greater than 0 when enabled",
        ));
    }
}

fn validate_retries(prefix: &str, retries: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if retries.initial_backoff_ms > retries.max_backoff_ms {
        errors.push(ValidationError::new(
            format!("{}.initial_backoff_ms", prefix),
            format!(
                "{} exceeds max_backoff_ms {}",
                retries.initial_backoff_ms, retries.max_backoff_ms
            ),
        ));
    }
    if !(0.0..=1.0).contains(&retries.jitter_ratio) {
        errors.push(ValidationError::new(
            format!("{}.jitter_ratio", prefix),
            format!("{} is outside 0.0-1.0", retries.jitter_ratio),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::OperationConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ResilienceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ResilienceConfig::default();
        config.circuit_breaker.error_threshold = 1.5;
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 0.0;
        config.retries.initial_backoff_ms = 5_000;
        config.retries.max_backoff_ms = 100;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "circuit_breaker.error_threshold"));
        assert!(errors.iter().any(|e| e.field == "rate_limit.requests_per_second"));
        assert!(errors.iter().any(|e| e.field == "retries.initial_backoff_ms"));
    }

    #[test]
    fn test_disabled_rate_limit_not_checked() {
        let mut config = ResilienceConfig::default();
        config.rate_limit.enabled = false;
        config.rate_limit.requests_per_second = 0.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_negative_rate_rejected() {
        let mut config = ResilienceConfig::default();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = -0.5;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "rate_limit.requests_per_second");

        config.rate_limit.requests_per_second = 0.25;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_override() {
        let mut config = ResilienceConfig::default();
        for _ in 0..2 {
            config.operations.push(OperationConfig {
                name: "children.list".into(),
                circuit_breaker: None,
                rate_limit: None,
                retries: None,
            });
        }
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "operations[1].name");
    }

    #[test]
    fn test_unknown_log_format() {
        let mut config = ResilienceConfig::default();
        config.observability.log_format = "xml".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("xml"));
    }
}
