//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience core. All types derive Serde traits for deserialization from
//! config files. Durations are stored as integer milliseconds and exposed as
//! `Duration` through accessor methods.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Resource type reported on wrapped errors (e.g. "family").
    pub resource_type: String,

    /// Deadline applied to each protected call, in milliseconds (0 = none).
    pub default_timeout_ms: u64,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Rate limiting settings.
    pub rate_limit: RateLimitConfig,

    /// Retry settings.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Per-operation overrides.
    pub operations: Vec<OperationConfig>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            resource_type: "repository".to_string(),
            default_timeout_ms: 30_000,
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retries: RetryConfig::default(),
            observability: ObservabilityConfig::default(),
            operations: Vec::new(),
        }
    }
}

impl ResilienceConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }

    /// Effective settings for `operation`, applying its override if one exists.
    pub fn for_operation(&self, operation: &str) -> EffectiveConfig {
        let overrides = self.operations.iter().find(|o| o.name == operation);
        EffectiveConfig {
            circuit_breaker: overrides
                .and_then(|o| o.circuit_breaker.clone())
                .unwrap_or_else(|| self.circuit_breaker.clone()),
            rate_limit: overrides
                .and_then(|o| o.rate_limit.clone())
                .unwrap_or_else(|| self.rate_limit.clone()),
            retries: overrides
                .and_then(|o| o.retries.clone())
                .unwrap_or_else(|| self.retries.clone()),
        }
    }
}

/// Settings resolved for one operation name.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub retries: RetryConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable the breaker. Disabled breakers are passthrough.
    pub enabled: bool,

    /// Upper bound on a single protected call, in milliseconds (0 = none).
    pub timeout_ms: u64,

    /// Maximum in-flight calls (0 = unlimited).
    pub max_concurrent: usize,

    /// Failure ratio (0.0-1.0) that trips the breaker.
    pub error_threshold: f64,

    /// Minimum requests in the window before the ratio is evaluated.
    pub volume_threshold: u64,

    /// How long the breaker stays open before allowing a trial, in milliseconds.
    pub sleep_window_ms: u64,

    /// Rolling window for the closed-state counters, in milliseconds (0 = never reset).
    pub window_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 10_000,
            max_concurrent: 100,
            error_threshold: 0.5,
            volume_threshold: 20,
            sleep_window_ms: 5_000,
            window_ms: 10_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn sleep_window(&self) -> Duration {
        Duration::from_millis(self.sleep_window_ms)
    }

    pub fn window(&self) -> Option<Duration> {
        (self.window_ms > 0).then(|| Duration::from_millis(self.window_ms))
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained refill rate; fractional rates below 1/s are allowed.
    pub requests_per_second: f64,

    /// Burst capacity.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100.0,
            burst_size: 50,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first (0 behaves as 1).
    pub max_retries: u32,

    /// Delay after the first failed attempt in milliseconds.
    pub initial_backoff_ms: u64,

    /// Cap for exponential backoff in milliseconds.
    pub max_backoff_ms: u64,

    /// Additive jitter as a fraction of the delay (0.0 = exact backoff).
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            jitter_ratio: 0.0,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Output format: "pretty" or "json".
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Override block for a single operation name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperationConfig {
    /// Operation name as passed to the executor.
    pub name: String,

    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(default)]
    pub retries: Option<RetryConfig>,
}
