//! Shared utilities for integration and load testing.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilience_core::config::ResilienceConfig;
use resilience_core::{Context, Error, Result};

type Behavior = dyn Fn(u32) -> Result<u32> + Send + Sync;

/// A scripted dependency that counts its calls.
///
/// `behavior` receives the 1-based call number. Clones share the counter.
#[derive(Clone)]
pub struct Backend {
    calls: Arc<AtomicU32>,
    healthy: Arc<AtomicBool>,
    behavior: Arc<Behavior>,
    latency: Duration,
}

#[allow(dead_code)]
impl Backend {
    pub fn new<F>(behavior: F) -> Self
    where
        F: Fn(u32) -> Result<u32> + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            healthy: Arc::new(AtomicBool::new(false)),
            behavior: Arc::new(behavior),
            latency: Duration::ZERO,
        }
    }

    /// Always succeeds, returning the call number.
    pub fn healthy() -> Self {
        let backend = Self::new(Ok);
        backend.set_healthy(true);
        backend
    }

    /// Fails with `error()` on every call until [`Backend::set_healthy`].
    pub fn failing(error: fn() -> Error) -> Self {
        Self::new(move |_| Err(error()))
    }

    /// Fails the first `n` calls with `error()`, then succeeds.
    pub fn failing_first(n: u32, error: fn() -> Error) -> Self {
        Self::new(move |call| if call <= n { Err(error()) } else { Ok(call) })
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Once healthy, every call succeeds regardless of the script.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// One call to the dependency.
    pub fn call(&self, _ctx: Context) -> impl Future<Output = Result<u32>> + Send + 'static {
        let this = self.clone();
        async move {
            let call = this.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !this.latency.is_zero() {
                tokio::time::sleep(this.latency).await;
            }
            if this.healthy.load(Ordering::SeqCst) {
                Ok(call)
            } else {
                (this.behavior)(call)
            }
        }
    }
}

/// Config with millisecond backoffs and no rate limiting.
#[allow(dead_code)]
pub fn fast_config() -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.resource_type = "family".into();
    config.default_timeout_ms = 5_000;
    config.circuit_breaker.timeout_ms = 0;
    config.circuit_breaker.window_ms = 0;
    config.retries.initial_backoff_ms = 1;
    config.retries.max_backoff_ms = 4;
    config
}

#[allow(dead_code)]
pub fn network_error() -> Error {
    Error::network("connection reset")
}

#[allow(dead_code)]
pub fn validation_error() -> Error {
    Error::validation("email", "malformed")
}
