//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap protected calls with a per-call timeout
//! - Cancel operations cleanly on timeout (the future is dropped)
//!
//! # Design Decisions
//! - Timeout errors are distinct from caller cancellation: a local timeout
//!   becomes `Error::Timeout`, the caller's own deadline stays
//!   `Error::DeadlineExceeded`

use std::future::Future;
use std::time::Duration;

use crate::context::Context;
use crate::error::{Error, Result};

/// Run `op` inside `ctx`, additionally bounded by `timeout` if given.
pub async fn run_with_timeout<F, Fut, T>(
    ctx: &Context,
    timeout: Option<Duration>,
    label: &str,
    op: F,
) -> Result<T>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let Some(timeout) = timeout else {
        return ctx.run(op(ctx.clone())).await;
    };

    let bounded = ctx.with_timeout(timeout);
    match bounded.run(op(bounded.clone())).await {
        Err(Error::DeadlineExceeded) if ctx.err().is_none() => {
            tracing::debug!(operation = %label, timeout_ms = timeout.as_millis() as u64, "Call timed out");
            Err(Error::Timeout {
                operation: label.to_string(),
                after: timeout,
            })
        }
        other => other,
    }
}
