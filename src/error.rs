//! Error taxonomy shared by every resilience layer.
//!
//! # Categories
//! - Admission rejection: `RateLimited`, `CircuitOpen`, `ConcurrencyLimited`
//! - Operation failure, non-retryable: `Validation`, `NotFound`, `Database`
//! - Operation failure, retryable: `Network`, `Timeout`, `Transient`
//! - Cancellation: `Cancelled`, `DeadlineExceeded`
//!
//! # Design Decisions
//! - Every error carries an `ErrorKind` discriminant; callers branch on it
//!   instead of downcasting
//! - Unclassified failures default to non-retryable

use std::time::Duration;
use serde::Serialize;
use thiserror::Error;

use crate::resilience::circuit_breaker::CircuitState;

/// Discriminant for [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Database,
    Network,
    Timeout,
    Transient,
    RateLimited,
    CircuitOpen,
    ConcurrencyLimited,
    Cancelled,
    DeadlineExceeded,
    Repository,
    Internal,
}

impl ErrorKind {
    /// Stable lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Database => "database",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::ConcurrencyLimited => "concurrency_limited",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Repository => "repository",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by protected operations and by the resilience layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected by domain validation.
    #[error("validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Requested entity does not exist.
    #[error("{resource} '{id}' not found")]
    NotFound { resource: String, id: String },

    /// Database reported a definitive failure.
    #[error("database error during {operation}: {message}")]
    Database { operation: String, message: String },

    /// Connection-level failure talking to a dependency.
    #[error("network error: {0}")]
    Network(String),

    /// A dependency call exceeded its time budget.
    #[error("operation '{operation}' timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// Failure explicitly marked safe to retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Token bucket had no token for this call.
    #[error("rate limit exceeded for '{name}'")]
    RateLimited { name: String },

    /// Circuit breaker rejected the call without running it.
    #[error("circuit breaker '{name}' is open ({state})")]
    CircuitOpen { name: String, state: CircuitState },

    /// Circuit breaker already has `max` calls in flight.
    #[error("circuit breaker '{name}' at max concurrency ({max})")]
    ConcurrencyLimited { name: String, max: usize },

    /// Caller cancelled the context.
    #[error("context cancelled")]
    Cancelled,

    /// Caller's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Generic wrapper for failures not already classified.
    #[error("{resource}: {message} [{code}]")]
    Repository {
        message: String,
        code: String,
        resource: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for resilience operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation { field: field.into(), message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound { resource: resource.into(), id: id.into() }
    }

    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Database { operation: operation.into(), message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Error::Network(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Error::Transient(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Wrap `cause` into a [`Error::Repository`] for `resource`.
    pub fn repository(resource: impl Into<String>, code: impl Into<String>, cause: Error) -> Self {
        Error::Repository {
            message: cause.to_string(),
            code: code.into(),
            resource: resource.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// The discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Database { .. } => ErrorKind::Database,
            Error::Network(_) => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Transient(_) => ErrorKind::Transient,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Error::ConcurrencyLimited { .. } => ErrorKind::ConcurrencyLimited,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Error::Repository { .. } => ErrorKind::Repository,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when a resilience layer rejected the call before it ran.
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited | ErrorKind::CircuitOpen | ErrorKind::ConcurrencyLimited
        )
    }

    /// True for caller-side cancellation or deadline expiry.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancelled | ErrorKind::DeadlineExceeded)
    }

    /// True for failures the caller already knows how to interpret.
    pub fn is_typed_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Database | ErrorKind::Repository
        )
    }

    /// Error code attached when this error gets wrapped.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Network(_) => "NETWORK_ERROR",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Transient(_) => "TRANSIENT_ERROR",
            Error::Repository { .. } | Error::Database { .. } => "DATABASE_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

/// Default retryability classifier.
///
/// Network, timeout and transient failures are retried. Validation and
/// not-found never are, and neither is anything unclassified.
pub fn is_retryable(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Transient
    )
}
