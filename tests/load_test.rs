//! Load testing for shared breakers, limiters and the executor.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::Barrier;

use resilience_core::config::RateLimitConfig;
use resilience_core::{CircuitState, Context, Error, ErrorKind, RateLimiter, ResilienceExecutor};

mod common;
use common::{fast_config, network_error, Backend};

#[tokio::test]
async fn test_load_performance() {
    let mut config = fast_config();
    config.circuit_breaker.max_concurrent = 0;
    let executor = Arc::new(ResilienceExecutor::new(config));
    let backend = Backend::healthy();

    let num_requests = 1_000;
    let start = Instant::now();

    let tasks = (0..num_requests).map(|_| {
        let executor = executor.clone();
        let backend = backend.clone();
        tokio::spawn(async move {
            executor
                .execute_with_resilience(&Context::background(), "families.get", |ctx| backend.call(ctx))
                .await
        })
    });
    let results = join_all(tasks).await;

    let elapsed = start.elapsed();
    let succeeded = results.into_iter().filter(|r| matches!(r, Ok(Ok(_)))).count();

    println!("Load Test Results:");
    println!("  Total Requests: {}", num_requests);
    println!("  Successful:     {}", succeeded);
    println!("  Duration:       {:?}", elapsed);
    println!("  Req/sec:        {:.2}", num_requests as f64 / elapsed.as_secs_f64());

    assert_eq!(succeeded, num_requests);
    assert_eq!(backend.calls(), num_requests as u32);
    assert!(elapsed < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_half_open_trial_under_load() {
    let mut config = fast_config();
    config.circuit_breaker.volume_threshold = 1;
    config.circuit_breaker.error_threshold = 1.0;
    config.circuit_breaker.sleep_window_ms = 50;
    config.retries.max_retries = 1;
    let executor = Arc::new(ResilienceExecutor::new(config));

    let failing = Backend::failing(network_error);
    let _ = executor
        .execute_with_resilience(&Context::background(), "families.get", |ctx| failing.call(ctx))
        .await;
    assert_eq!(executor.breaker("families.get").state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;

    let callers = 50;
    let barrier = Arc::new(Barrier::new(callers));
    let backend = Backend::healthy().with_latency(Duration::from_millis(100));

    let tasks = (0..callers).map(|_| {
        let executor = executor.clone();
        let backend = backend.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            executor
                .execute_with_resilience(&Context::background(), "families.get", |ctx| backend.call(ctx))
                .await
        })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(Error::CircuitOpen { state: CircuitState::HalfOpen, .. })))
        .count();

    assert_eq!(backend.calls(), 1, "exactly one trial call reaches the dependency");
    assert_eq!(succeeded, 1);
    assert_eq!(rejected, callers - 1);
    assert_eq!(executor.breaker("families.get").state(), CircuitState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limiter_never_over_admits() {
    let limiter = RateLimiter::new("families.list", RateLimitConfig {
        enabled: true,
        requests_per_second: 1.0,
        burst_size: 20,
    });
    let admitted = Arc::new(AtomicU32::new(0));
    let callers = 200;
    let barrier = Arc::new(Barrier::new(callers));

    let tasks = (0..callers).map(|_| {
        let limiter = limiter.clone();
        let admitted = admitted.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            let _ = limiter
                .execute(&Context::background(), "families.list", |_| async {
                    admitted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
        })
    });
    join_all(tasks).await;

    // Burst plus at most one token refilled while the test ran.
    let admitted = admitted.load(Ordering::SeqCst);
    assert!(admitted >= 20, "admitted {admitted}");
    assert!(admitted <= 21, "admitted {admitted}");
}

#[tokio::test]
async fn test_max_concurrent_under_load() {
    let mut config = fast_config();
    config.circuit_breaker.max_concurrent = 5;
    let executor = Arc::new(ResilienceExecutor::new(config));
    let backend = Backend::healthy().with_latency(Duration::from_millis(50));

    let callers = 20;
    let barrier = Arc::new(Barrier::new(callers));
    let tasks = (0..callers).map(|_| {
        let executor = executor.clone();
        let backend = backend.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            executor
                .execute_with_resilience(&Context::background(), "families.get", |ctx| backend.call(ctx))
                .await
        })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let limited = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::ConcurrencyLimited))
        .count();

    assert_eq!(succeeded, 5);
    assert_eq!(limited, 15);
    assert_eq!(backend.calls(), 5);
    assert_eq!(executor.breaker("families.get").stats().unwrap().request_count, 5);
}
