//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → passed explicitly into each executor / breaker / limiter constructor
//! ```
//!
//! # Design Decisions
//! - No global config; every component receives its settings at construction
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_str, ConfigError};
pub use schema::{
    CircuitBreakerConfig, EffectiveConfig, ObservabilityConfig, OperationConfig, RateLimitConfig,
    ResilienceConfig, RetryConfig,
};
pub use validation::{validate_config, ValidationError};
