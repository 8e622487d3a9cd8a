//! Token bucket rate limiting.
//!
//! # Responsibilities
//! - Admit or reject calls per named operation
//! - Optionally wait (cancellably) for a token instead of rejecting
//!
//! # Design Decisions
//! - Lazy refill on each call; no background task
//! - Tokens are fractional so slow rates are not under-refilled
//! - A disabled limiter is an empty handle and admits everything

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::observability::metrics;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one token is available, `None` if it never will be.
    fn time_until_available(&self) -> Option<Duration> {
        if self.capacity < 1.0 || self.refill_rate <= 0.0 {
            return None;
        }
        let needed = (1.0 - self.tokens).max(0.0);
        Some(Duration::from_secs_f64(needed / self.refill_rate))
    }
}

#[derive(Debug)]
struct LimiterCore {
    name: String,
    bucket: Mutex<TokenBucket>,
}

impl LimiterCore {
    fn lock(&self) -> MutexGuard<'_, TokenBucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to a named token bucket.
///
/// Cloning shares the bucket. A disabled handle admits every call.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    core: Option<Arc<LimiterCore>>,
}

impl RateLimiter {
    /// Create a limiter named `name`; a disabled handle if `config.enabled` is false.
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        let name = name.into();
        if !config.enabled {
            tracing::debug!(limiter = %name, "Rate limiter disabled");
            return Self::disabled();
        }

        tracing::debug!(
            limiter = %name,
            requests_per_second = config.requests_per_second,
            burst_size = config.burst_size,
            "Rate limiter initialized"
        );
        Self {
            core: Some(Arc::new(LimiterCore {
                name,
                bucket: Mutex::new(TokenBucket::new(
                    config.burst_size as f64,
                    config.requests_per_second,
                )),
            })),
        }
    }

    /// A limiter that admits everything.
    pub fn disabled() -> Self {
        Self { core: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.core.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.core.as_deref().map(|c| c.name.as_str())
    }

    /// Try to take one token.
    pub fn allow(&self) -> bool {
        match self.core.as_deref() {
            Some(core) => core.lock().try_acquire(),
            None => true,
        }
    }

    /// Tokens currently available after refill, `None` when disabled.
    pub fn available_tokens(&self) -> Option<f64> {
        let core = self.core.as_deref()?;
        let mut bucket = core.lock();
        bucket.refill();
        Some(bucket.tokens)
    }

    /// Refill the bucket to capacity.
    pub fn reset(&self) {
        if let Some(core) = self.core.as_deref() {
            let mut bucket = core.lock();
            bucket.tokens = bucket.capacity;
            bucket.last_refill = Instant::now();
        }
    }

    /// Run `op` if a token is available, otherwise fail with
    /// [`Error::RateLimited`] without invoking it.
    pub async fn execute<F, Fut, T>(&self, ctx: &Context, label: &str, op: F) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(core) = self.core.as_deref() else {
            return op(ctx.clone()).await;
        };

        if !core.lock().try_acquire() {
            tracing::debug!(limiter = %core.name, operation = %label, "Rate limit exceeded");
            metrics::record_rejection(label, crate::error::ErrorKind::RateLimited);
            return Err(Error::RateLimited {
                name: core.name.clone(),
            });
        }
        op(ctx.clone()).await
    }

    /// Run `op` once a token is available, waiting as long as `ctx` allows.
    ///
    /// Returns the context error if it is cancelled or its deadline passes
    /// while waiting.
    pub async fn execute_with_wait<F, Fut, T>(&self, ctx: &Context, label: &str, op: F) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.wait(ctx, label).await?;
        op(ctx.clone()).await
    }

    /// Block until a token is taken or `ctx` finishes.
    ///
    /// Fails with [`Error::DeadlineExceeded`] without sleeping when the
    /// context's deadline would pass before the next token is available.
    pub async fn wait(&self, ctx: &Context, label: &str) -> Result<()> {
        let Some(core) = self.core.as_deref() else {
            return Ok(());
        };

        let mut waited = false;
        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }

            let delay = {
                let mut bucket = core.lock();
                if bucket.try_acquire() {
                    None
                } else {
                    Some(bucket.time_until_available())
                }
            };

            match delay {
                None => {
                    if waited {
                        tracing::trace!(limiter = %core.name, operation = %label, "Token acquired after wait");
                    }
                    return Ok(());
                }
                Some(Some(delay)) => {
                    if ctx.remaining().is_some_and(|left| left < delay) {
                        tracing::debug!(
                            limiter = %core.name,
                            operation = %label,
                            wait_ms = delay.as_millis() as u64,
                            "Deadline passes before next token"
                        );
                        return Err(Error::DeadlineExceeded);
                    }
                    waited = true;
                    ctx.sleep(delay).await?;
                }
                Some(None) => {
                    tracing::warn!(limiter = %core.name, operation = %label, "Bucket can never refill, waiting for context");
                    return Err(ctx.done().await);
                }
            }
        }
    }
}
