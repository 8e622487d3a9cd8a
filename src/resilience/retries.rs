//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a failure is retryable (via a pluggable classifier)
//! - Execute retries with capped exponential backoff
//! - Stop promptly when the caller's context is cancelled
//!
//! # Design Decisions
//! - `max_retries` counts total attempts, so an always-failing retryable
//!   operation runs exactly `max_retries` times
//! - Cancellation errors are never retried
//! - Backoff sleeps race the context; no wait outlives the caller

use std::future::Future;

use crate::config::RetryConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Runs an operation until it succeeds, fails definitively, or runs out of attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Total attempts per call (at least one).
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.max(1)
    }

    /// Execute `op`, retrying failures that `is_retryable` accepts.
    ///
    /// Returns the last observed error when attempts are exhausted, or the
    /// context error if the context finishes first.
    pub async fn execute<F, Fut, T, C>(
        &self,
        ctx: &Context,
        label: &str,
        mut op: F,
        is_retryable: C,
    ) -> Result<T>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> bool,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match ctx.run(op(ctx.clone())).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation = %label, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if err.is_cancellation() || !is_retryable(&err) {
                tracing::debug!(operation = %label, attempt, error = %err, "Not retrying");
                return Err(err);
            }
            if let Some(ctx_err) = ctx.err() {
                return Err(ctx_err);
            }
            if attempt >= max_attempts {
                tracing::warn!(operation = %label, attempts = attempt, error = %err, "Retries exhausted");
                return Err(err);
            }

            let delay = calculate_backoff(
                attempt,
                self.config.initial_backoff(),
                self.config.max_backoff(),
                self.config.jitter_ratio,
            );
            tracing::info!(
                operation = %label,
                attempt,
                delay = ?delay,
                error = %err,
                "Retrying operation"
            );
            metrics::record_retry(label);
            ctx.sleep(delay).await?;
        }
    }
}
