//! Cancellation and deadline propagation for a single strategy run.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ports::StoreError;

/// Per-call context threaded through every store round trip of a run.
///
/// Dropping the future returned by a strategy also abandons the run; the
/// context exists for callers that need to cancel from elsewhere or bound
/// the total time spent talking to the store.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_at(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::background().deadline_at(deadline)
    }

    /// A context cancelled together with `token`.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Replace the deadline, keeping the cancellation token.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Token that cancels this context.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a store future, giving up when the context is cancelled or its
    /// deadline passes.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(StoreError::DeadlineExceeded);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled),
            _ = expired(self.deadline) => Err(StoreError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
