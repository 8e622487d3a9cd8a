//! Composition root for protected calls.
//!
//! # Data Flow
//! ```text
//! execute_with_resilience(ctx, name, op)
//!     → rate_limit.rs   (reject excess load before it counts against the breaker)
//!     → circuit_breaker.rs (fail fast before any retry hits an unhealthy dependency)
//!     → timeouts.rs     (default_timeout; expiry is a breaker failure)
//!     → retries.rs      (only admitted, circuit-checked calls are retried)
//!     → op(ctx)
//!     → normalize error
//! ```
//!
//! # Design Decisions
//! - Guards are created once per operation name and shared by all callers
//! - Admission rejections and caller cancellation are returned verbatim
//! - The default timeout is applied inside the breaker, so a hanging
//!   dependency trips it like any other failure
//! - Unclassified failures are wrapped into `Error::Repository`

use std::future::Future;
use std::sync::Arc;
use dashmap::DashMap;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ResilienceConfig;
use crate::context::Context;
use crate::error::{is_retryable, Error, Result};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::resilience::rate_limit::RateLimiter;
use crate::resilience::retries::RetryExecutor;
use crate::resilience::timeouts::run_with_timeout;

/// Decides whether a failed attempt may be retried.
pub type Classifier = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Layers owned by one operation name.
#[derive(Debug)]
struct OperationGuards {
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryExecutor,
}

/// Applies rate limiting, circuit breaking and retries to named operations.
pub struct ResilienceExecutor {
    config: ResilienceConfig,
    operations: DashMap<String, Arc<OperationGuards>>,
    classifier: Classifier,
}

impl std::fmt::Debug for ResilienceExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceExecutor")
            .field("resource_type", &self.config.resource_type)
            .field("operations", &self.operations.len())
            .finish()
    }
}

impl ResilienceExecutor {
    /// Build an executor. Guards for every configured override are created
    /// up front; other names get theirs on first use.
    pub fn new(config: ResilienceConfig) -> Self {
        let executor = Self {
            config,
            operations: DashMap::new(),
            classifier: Arc::new(is_retryable),
        };
        for name in executor.config.operations.iter().map(|o| o.name.clone()) {
            executor.guards(&name);
        }
        tracing::info!(
            resource_type = %executor.config.resource_type,
            default_timeout_ms = executor.config.default_timeout_ms,
            overrides = executor.config.operations.len(),
            "Resilience executor initialized"
        );
        executor
    }

    /// Replace the default retryability classifier.
    pub fn with_classifier<C>(mut self, classifier: C) -> Self
    where
        C: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// The breaker shared by every call to `name`.
    pub fn breaker(&self, name: &str) -> CircuitBreaker {
        self.guards(name).breaker.clone()
    }

    /// The limiter shared by every call to `name`.
    pub fn limiter(&self, name: &str) -> RateLimiter {
        self.guards(name).limiter.clone()
    }

    /// Stats for every enabled breaker created so far, sorted by name.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self
            .operations
            .iter()
            .filter_map(|entry| entry.value().breaker.stats())
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Close every breaker and refill every bucket.
    pub fn reset_all(&self) {
        for entry in self.operations.iter() {
            entry.value().breaker.reset();
            entry.value().limiter.reset();
        }
        tracing::info!(operations = self.operations.len(), "All resilience guards reset");
    }

    fn guards(&self, name: &str) -> Arc<OperationGuards> {
        if let Some(existing) = self.operations.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .operations
            .entry(name.to_string())
            .or_insert_with(|| {
                let effective = self.config.for_operation(name);
                Arc::new(OperationGuards {
                    limiter: RateLimiter::new(name, effective.rate_limit),
                    breaker: CircuitBreaker::new(name, effective.circuit_breaker),
                    retry: RetryExecutor::new(effective.retries),
                })
            });
        Arc::clone(entry.value())
    }

    /// Run `op` as operation `name` through every resilience layer.
    pub async fn execute_with_resilience<F, Fut, T>(&self, ctx: &Context, name: &str, op: F) -> Result<T>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guards = self.guards(name);
        let default_timeout = self.config.default_timeout();

        let limiter = &guards.limiter;
        let breaker = &guards.breaker;
        let retry = &guards.retry;
        let classifier = self.classifier.as_ref();

        let span = tracing::debug_span!("resilience", operation = %name, call_id = %Uuid::new_v4());
        let result = async {
            limiter
                .execute(ctx, name, |ctx| async move {
                    breaker
                        .execute(&ctx, name, |ctx| async move {
                            run_with_timeout(&ctx, default_timeout, name, |ctx| async move {
                                retry.execute(&ctx, name, op, classifier).await
                            })
                            .await
                        })
                        .await
                })
                .await
        }
        .instrument(span)
        .await;

        metrics::record_call(name, result.as_ref().map(|_| ()).map_err(Error::kind));

        result.map_err(|err| self.normalize(name, err))
    }

    /// Pass typed failures, rejections and cancellation through; wrap the rest.
    fn normalize(&self, name: &str, err: Error) -> Error {
        if err.is_admission_rejection() || err.is_cancellation() || err.is_typed_failure() {
            tracing::debug!(operation = %name, error = %err, kind = %err.kind(), "Call failed");
            return err;
        }
        tracing::warn!(operation = %name, error = %err, kind = %err.kind(), "Call failed, wrapping error");
        let code = err.code();
        Error::repository(self.config.resource_type.clone(), code, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OperationConfig, RateLimitConfig};
    use crate::error::ErrorKind;
    use crate::resilience::circuit_breaker::CircuitState;
    use std::error::Error as _;

    fn quiet_config() -> ResilienceConfig {
        let mut config = ResilienceConfig::default();
        config.resource_type = "family".into();
        config.retries.initial_backoff_ms = 1;
        config.retries.max_backoff_ms = 2;
        config
    }

    #[tokio::test]
    async fn test_success_passes_value() {
        let executor = ResilienceExecutor::new(quiet_config());
        let value = executor
            .execute_with_resilience(&Context::background(), "families.get", |_| async { Ok(11) })
            .await
            .unwrap();
        assert_eq!(value, 11);
    }

    #[tokio::test]
    async fn test_typed_failures_pass_through() {
        let executor = ResilienceExecutor::new(quiet_config());
        let err = executor
            .execute_with_resilience(&Context::background(), "families.get", |_| async {
                Err::<(), _>(Error::not_found("family", "9"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unclassified_failure_is_wrapped() {
        let executor = ResilienceExecutor::new(quiet_config());
        let err = executor
            .execute_with_resilience(&Context::background(), "families.get", |_| async {
                Err::<(), _>(Error::network("connection refused"))
            })
            .await
            .unwrap_err();

        match &err {
            Error::Repository { code, resource, .. } => {
                assert_eq!(code, "NETWORK_ERROR");
                assert_eq!(resource, "family");
            }
            other => panic!("unexpected error: {other}"),
        }
        let cause = err.source().expect("cause kept");
        assert_eq!(cause.to_string(), "network error: connection refused");
    }

    #[tokio::test]
    async fn test_same_name_shares_guards() {
        let executor = ResilienceExecutor::new(quiet_config());
        let a = executor.breaker("families.get");
        let b = executor.breaker("families.get");
        let other = executor.breaker("children.get");

        a.reset();
        assert_eq!(executor.stats().len(), 2);
        assert_eq!(b.name(), Some("families.get"));
        assert_eq!(other.name(), Some("children.get"));
    }

    #[tokio::test]
    async fn test_override_applies_per_name() {
        let mut config = quiet_config();
        config.operations.push(OperationConfig {
            name: "families.search".into(),
            circuit_breaker: None,
            rate_limit: Some(RateLimitConfig {
                enabled: true,
                requests_per_second: 1.0,
                burst_size: 1,
            }),
            retries: None,
        });
        let executor = ResilienceExecutor::new(config);

        assert!(executor.limiter("families.search").is_enabled());
        assert!(!executor.limiter("families.get").is_enabled());

        let ctx = Context::background();
        executor
            .execute_with_resilience(&ctx, "families.search", |_| async { Ok(()) })
            .await
            .unwrap();
        let err = executor
            .execute_with_resilience(&ctx, "families.search", |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn test_custom_classifier_is_used() {
        let executor = ResilienceExecutor::new(quiet_config())
            .with_classifier(|err: &Error| matches!(err, Error::Database { .. }));
        let calls = std::sync::atomic::AtomicU32::new(0);

        let err = executor
            .execute_with_resilience(&Context::background(), "families.save", |_| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err::<(), _>(Error::database("insert", "serialization failure")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(matches!(err, Error::Database { .. }));
    }

    #[tokio::test]
    async fn test_reset_all() {
        let mut config = quiet_config();
        config.circuit_breaker.volume_threshold = 1;
        config.circuit_breaker.error_threshold = 1.0;
        let executor = ResilienceExecutor::new(config);

        let _ = executor
            .execute_with_resilience(&Context::background(), "families.get", |_| async {
                Err::<(), _>(Error::validation("id", "bad"))
            })
            .await;
        assert_eq!(executor.breaker("families.get").state(), CircuitState::Open);

        executor.reset_all();
        assert_eq!(executor.breaker("families.get").state(), CircuitState::Closed);
    }
}
