//! Resilience execution core.
//!
//! Wraps calls to an unreliable dependency with rate limiting, circuit
//! breaking and retries, all bounded by a caller-supplied [`Context`].

pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod resilience;

pub use config::schema::ResilienceConfig;
pub use context::{CancelHandle, Context};
pub use error::{is_retryable, Error, ErrorKind, Result};
pub use resilience::{CircuitBreaker, CircuitState, RateLimiter, ResilienceExecutor, RetryExecutor};
