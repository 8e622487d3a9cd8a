//! Execution context carried through every resilience layer.
//!
//! # Responsibilities
//! - Carry an optional deadline (earliest one wins when nesting)
//! - Carry cancellation signals from the caller and every ancestor
//! - Provide cancellable sleeps and races for the layers that wait
//!
//! # Design Decisions
//! - Cancellation is a `watch` channel per scope; a child observes all of its
//!   ancestors' channels
//! - Deadlines use `tokio::time::Instant` so they compose with tokio timers
//! - Dropping a [`CancelHandle`] never cancels; only [`CancelHandle::cancel`] does

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use futures_util::future::{select_all, FutureExt};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Deadline and cancellation scope for one call.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    signals: Vec<watch::Receiver<bool>>,
}

/// Trigger for a cancellable [`Context`].
///
/// Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel the associated context and all of its descendants.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Child context bounded by `deadline` (or the parent's, if earlier).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            signals: self.signals.clone(),
        }
    }

    /// Child context that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context that can be cancelled independently of its parent.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut signals = self.signals.clone();
        signals.push(rx);
        (
            Self {
                deadline: self.deadline,
                signals,
            },
            CancelHandle { tx: Arc::new(tx) },
        )
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals.iter().any(|rx| *rx.borrow())
    }

    /// `Some` once the context is cancelled or past its deadline.
    pub fn err(&self) -> Option<Error> {
        if self.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is done, with the reason.
    pub async fn done(&self) -> Error {
        let cancelled = async {
            if self.signals.is_empty() {
                std::future::pending::<()>().await
            } else {
                let waits = self
                    .signals
                    .iter()
                    .cloned()
                    .map(|rx| wait_cancelled(rx).boxed());
                select_all(waits).await;
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Error::Cancelled,
            _ = expired => Error::DeadlineExceeded,
        }
    }

    /// Race `fut` against this context.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }

    /// Sleep for `duration` unless the context finishes first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

async fn wait_cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Handle dropped without cancelling.
            std::future::pending::<()>().await;
        }
    }
}
