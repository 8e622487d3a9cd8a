//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and are counted
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a single trial call tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: request_count >= volume_threshold
//!                and failure_count / request_count >= error_threshold
//! Open → Half-Open: sleep_window elapsed since last transition
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - One breaker per protected resource name, shared by all callers
//! - Fail fast in Open state (the operation is never invoked)
//! - Single trial in Half-Open; concurrent callers fail fast meanwhile
//! - One mutex guards state and counters and is never held across the call
//! - Results that land after a transition or window roll they did not cause
//!   are ignored
//! - Only the caller's own cancellation is excused; a deadline hit inside the
//!   operation while the caller is still waiting counts as a failure
//! - A disabled breaker is an empty handle: every method is a passthrough

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::resilience::timeouts::run_with_timeout;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub request_count: u64,
    /// `failure_count / request_count`, 0.0 with no requests.
    pub failure_rate: f64,
    pub millis_since_state_change: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    request_count: u64,
    last_state_change: Instant,
    window_start: Instant,
    trial_in_flight: bool,
    /// Bumped on every transition, reset and window roll.
    generation: u64,
}

impl BreakerState {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            request_count: 0,
            last_state_change: now,
            window_start: now,
            trial_in_flight: false,
            generation: 0,
        }
    }

    fn reset_counters(&mut self, now: Instant) {
        self.failure_count = 0;
        self.success_count = 0;
        self.request_count = 0;
        self.window_start = now;
    }

    fn transition(&mut self, to: CircuitState, now: Instant) -> Transition {
        let from = self.state;
        self.state = to;
        self.last_state_change = now;
        self.trial_in_flight = false;
        self.generation += 1;
        self.reset_counters(now);
        Transition { from, to }
    }

    fn failure_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.request_count as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Caller gave up (cancelled, deadline, or dropped the future).
    Abandoned,
}

#[derive(Debug)]
struct BreakerCore {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    slots: Option<Arc<Semaphore>>,
}

impl BreakerCore {
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed. Returns the generation it was
    /// admitted under and whether it is the half-open trial.
    fn admit(&self) -> Result<(u64, bool)> {
        let now = Instant::now();
        let mut transition = None;

        let decision = {
            let mut s = self.lock();
            let state = s.state;
            match state {
                CircuitState::Closed => {
                    if let Some(window) = self.config.window() {
                        if now.duration_since(s.window_start) >= window {
                            s.reset_counters(now);
                            s.generation += 1;
                        }
                    }
                    Ok((s.generation, false))
                }
                CircuitState::Open => {
                    if now.duration_since(s.last_state_change) < self.config.sleep_window() {
                        Err(CircuitState::Open)
                    } else {
                        transition = Some(s.transition(CircuitState::HalfOpen, now));
                        s.trial_in_flight = true;
                        Ok((s.generation, true))
                    }
                }
                CircuitState::HalfOpen => {
                    if s.trial_in_flight {
                        Err(CircuitState::HalfOpen)
                    } else {
                        s.trial_in_flight = true;
                        Ok((s.generation, true))
                    }
                }
            }
        };

        if let Some(t) = transition {
            self.announce(t);
        }
        decision.map_err(|state| Error::CircuitOpen {
            name: self.name.clone(),
            state,
        })
    }

    fn record(&self, generation: u64, trial: bool, outcome: Outcome) {
        let now = Instant::now();
        let transition = {
            let mut s = self.lock();
            if s.generation != generation {
                return;
            }
            match outcome {
                Outcome::Abandoned => {
                    if trial {
                        s.trial_in_flight = false;
                    }
                    None
                }
                Outcome::Success => {
                    s.success_count += 1;
                    s.request_count += 1;
                    if s.state == CircuitState::HalfOpen {
                        Some(s.transition(CircuitState::Closed, now))
                    } else {
                        None
                    }
                }
                Outcome::Failure => {
                    s.failure_count += 1;
                    s.request_count += 1;
                    let state = s.state;
                    match state {
                        CircuitState::HalfOpen => Some(s.transition(CircuitState::Open, now)),
                        CircuitState::Closed
                            if s.request_count >= self.config.volume_threshold
                                && s.failure_rate() >= self.config.error_threshold =>
                        {
                            let failures = s.failure_count;
                            let requests = s.request_count;
                            let t = s.transition(CircuitState::Open, now);
                            tracing::debug!(
                                breaker = %self.name,
                                failures,
                                requests,
                                error_threshold = self.config.error_threshold,
                                "Error threshold crossed"
                            );
                            Some(t)
                        }
                        _ => None,
                    }
                }
            }
        };

        if let Some(t) = transition {
            self.announce(t);
        }
    }

    fn announce(&self, t: Transition) {
        match t.to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %t.from,
                sleep_window_ms = self.config.sleep_window_ms,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                breaker = %self.name,
                "Circuit breaker half-open, admitting trial call"
            ),
            CircuitState::Closed => tracing::info!(
                breaker = %self.name,
                from = %t.from,
                "Circuit breaker closed"
            ),
        }
        metrics::record_state_transition(&self.name, t.to);
    }
}

/// Admission held for the duration of one protected call.
///
/// Dropping it without [`Ticket::finish`] records the call as abandoned, so a
/// half-open trial slot is never leaked by a dropped future.
struct Ticket<'a> {
    core: &'a BreakerCore,
    generation: u64,
    trial: bool,
    finished: bool,
    _slot: Option<OwnedSemaphorePermit>,
}

impl Ticket<'_> {
    fn finish(mut self, outcome: Outcome) {
        self.finished = true;
        self.core.record(self.generation, self.trial, outcome);
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.core.record(self.generation, self.trial, Outcome::Abandoned);
        }
    }
}

/// Shared handle to a named circuit breaker.
///
/// Cloning is cheap and shares state. A handle built from a disabled config
/// (or via [`CircuitBreaker::disabled`]) holds no state and passes every call
/// straight through.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    core: Option<Arc<BreakerCore>>,
}

impl CircuitBreaker {
    /// Create a breaker named `name`; a disabled handle if `config.enabled` is false.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        if !config.enabled {
            tracing::debug!(breaker = %name, "Circuit breaker disabled");
            return Self::disabled();
        }

        tracing::debug!(
            breaker = %name,
            error_threshold = config.error_threshold,
            volume_threshold = config.volume_threshold,
            sleep_window_ms = config.sleep_window_ms,
            "Circuit breaker initialized"
        );

        let slots = (config.max_concurrent > 0).then(|| Arc::new(Semaphore::new(config.max_concurrent)));
        Self {
            core: Some(Arc::new(BreakerCore {
                name,
                config,
                inner: Mutex::new(BreakerState::new(Instant::now())),
                slots,
            })),
        }
    }

    /// A passthrough breaker with no state.
    pub fn disabled() -> Self {
        Self { core: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.core.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.core.as_deref().map(|c| c.name.as_str())
    }

    /// Current state. Disabled breakers report `Closed`.
    pub fn state(&self) -> CircuitState {
        match self.core.as_deref() {
            Some(core) => core.lock().state,
            None => CircuitState::Closed,
        }
    }

    /// Counters and state, `None` for a disabled breaker.
    pub fn stats(&self) -> Option<CircuitBreakerStats> {
        let core = self.core.as_deref()?;
        let s = core.lock();
        Some(CircuitBreakerStats {
            name: core.name.clone(),
            state: s.state,
            failure_count: s.failure_count,
            success_count: s.success_count,
            request_count: s.request_count,
            failure_rate: s.failure_rate(),
            millis_since_state_change: s.last_state_change.elapsed().as_millis() as u64,
        })
    }

    /// Force the breaker closed and zero its counters.
    pub fn reset(&self) {
        let Some(core) = self.core.as_deref() else {
            return;
        };
        let now = Instant::now();
        let previous = {
            let mut s = core.lock();
            let previous = s.state;
            s.transition(CircuitState::Closed, now);
            previous
        };
        tracing::info!(breaker = %core.name, from = %previous, "Circuit breaker reset");
        metrics::record_state_transition(&core.name, CircuitState::Closed);
    }

    /// Run `op` under breaker protection.
    ///
    /// Fails fast with [`Error::CircuitOpen`] when open (or while another
    /// caller holds the half-open trial) and with
    /// [`Error::ConcurrencyLimited`] when `max_concurrent` calls are in flight.
    pub async fn execute<F, Fut, T>(&self, ctx: &Context, label: &str, op: F) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(core) = self.core.as_deref() else {
            return op(ctx.clone()).await;
        };

        let (generation, trial) = match core.admit() {
            Ok(admitted) => admitted,
            Err(err) => {
                tracing::debug!(breaker = %core.name, operation = %label, error = %err, "Call rejected");
                metrics::record_rejection(label, err.kind());
                return Err(err);
            }
        };

        let mut ticket = Ticket {
            core,
            generation,
            trial,
            finished: false,
            _slot: None,
        };

        if let Some(slots) = &core.slots {
            match slots.clone().try_acquire_owned() {
                Ok(permit) => ticket._slot = Some(permit),
                Err(_) => {
                    let err = Error::ConcurrencyLimited {
                        name: core.name.clone(),
                        max: core.config.max_concurrent,
                    };
                    tracing::debug!(breaker = %core.name, operation = %label, "Call rejected, breaker saturated");
                    metrics::record_rejection(label, err.kind());
                    ticket.finish(Outcome::Abandoned);
                    return Err(err);
                }
            }
        }

        if trial {
            tracing::debug!(breaker = %core.name, operation = %label, "Running half-open trial");
        }

        let result = run_with_timeout(ctx, core.config.timeout(), label, op).await;

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(err) if err.is_cancellation() && ctx.err().is_some() => Outcome::Abandoned,
            Err(_) => Outcome::Failure,
        };
        ticket.finish(outcome);
        result
    }

    /// Like [`execute`](Self::execute), but any failure (including fail-fast
    /// rejection) is handed to `fallback`, whose result is returned instead.
    pub async fn execute_with_fallback<F, Fut, FB, FbFut, T>(
        &self,
        ctx: &Context,
        label: &str,
        op: F,
        fallback: FB,
    ) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce(Context, Error) -> FbFut,
        FbFut: Future<Output = Result<T>>,
    {
        match self.execute(ctx, label, op).await {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::debug!(operation = %label, error = %err, "Using fallback");
                fallback(ctx.clone(), err).await
            }
        }
    }
}
