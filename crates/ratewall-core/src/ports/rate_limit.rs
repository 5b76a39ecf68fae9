//! Rate limiting port.

use async_trait::async_trait;

use crate::context::RunContext;
use crate::domain::{RateLimitRequest, RateLimitResult};
use crate::error::RateLimitError;

/// Strategy trait - a counting algorithm run against the shared store.
///
/// Callers pick an implementation at construction time and only ever call
/// [`Strategy::run`], so algorithms can be swapped without touching call
/// sites.
///
/// Errors are never retried here. Whether a store outage should admit the
/// request (fail open) or reject it (fail closed), and any retry or backoff,
/// is the caller's decision.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Check `request` and record it against its key.
    ///
    /// Every store call made on the way honours `ctx`: once it is cancelled
    /// or past its deadline the run fails instead of returning a result
    /// built from partial state.
    async fn run(
        &self,
        ctx: &RunContext,
        request: &RateLimitRequest,
    ) -> Result<RateLimitResult, RateLimitError>;
}
