//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Protected call:
//!     → executor.rs (per-operation guards, default deadline, error normalization)
//!     → rate_limit.rs (token bucket admission)
//!     → circuit_breaker.rs (fail fast, per-call timeout via timeouts.rs)
//!     → retries.rs (classify, back off via backoff.rs, retry)
//!     → operation
//! ```
//!
//! # Design Decisions
//! - Every wait is bounded by the caller's `Context`
//! - Breakers and limiters are shared handles keyed by operation name
//! - Disabled components are empty handles, never special cases at call sites

pub mod backoff;
pub mod circuit_breaker;
pub mod executor;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use executor::{Classifier, ResilienceExecutor};
pub use rate_limit::RateLimiter;
pub use retries::RetryExecutor;
