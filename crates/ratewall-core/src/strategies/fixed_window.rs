//! Fixed-window counter strategy.

use std::sync::Arc;

use async_trait::async_trait;

use super::{as_count, window_end};
use crate::context::RunContext;
use crate::domain::{RateLimitRequest, RateLimitResult};
use crate::error::RateLimitError;
use crate::ports::{Batch, Clock, Command, CounterStore, KeyTtl, Strategy};

/// One counter per key with a time to live equal to the window.
///
/// Each run sends `INCR` and `PTTL` together. When the key turns out to have
/// no expiry (fresh key, or an earlier `PEXPIRE` that never landed) the
/// expiry is re-armed. That check happens on every call, not only the first,
/// because the increment and the expiry are independent commands and either
/// can fail on its own. A failed TTL read is treated like a missing TTL.
///
/// The counter is never reset by this strategy; it only returns to zero when
/// the key expires. Two late requests racing on a key that just expired may
/// both re-arm the expiry, which is idempotent but can push the window
/// boundary back slightly.
pub struct FixedWindowCounter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl FixedWindowCounter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl Strategy for FixedWindowCounter {
    async fn run(
        &self,
        ctx: &RunContext,
        request: &RateLimitRequest,
    ) -> Result<RateLimitResult, RateLimitError> {
        let key = request.key.as_str();

        let mut batch = Batch::new();
        let incr = batch.incr(key);
        let pttl = batch.pttl(key);

        let replies = ctx
            .guard(self.store.exec_batch(batch))
            .await
            .map_err(|e| RateLimitError::store(key, "INCR+PTTL pipeline", e))?;

        let count = replies
            .get(incr)
            .map_err(|e| RateLimitError::store(key, "INCR", e))?;
        let total_requests = as_count(key, "INCR", count)?;

        let ttl = match replies.get(pttl).map(KeyTtl::from_pttl) {
            Ok(KeyTtl::Expires(ttl)) => ttl,
            observed => {
                tracing::debug!(key = %key, ttl = ?observed, "Arming window expiry");
                ctx.guard(self.store.exec(Command::PExpire {
                    key: key.to_string(),
                    ttl: request.duration,
                }))
                .await
                .map_err(|e| RateLimitError::store(key, "PEXPIRE", e))?;
                request.duration
            }
        };

        let expires_at = window_end(self.clock.now(), ttl);

        if total_requests > request.limit {
            tracing::warn!(
                key = %key,
                total_requests,
                limit = request.limit,
                "Rate limit exceeded (fixed window)"
            );
            return Ok(RateLimitResult::deny(total_requests, expires_at));
        }

        tracing::debug!(key = %key, total_requests, limit = request.limit, "Request allowed");
        Ok(RateLimitResult::allow(total_requests, expires_at))
    }
}
