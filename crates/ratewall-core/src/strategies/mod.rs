//! Counting strategies run against a [`CounterStore`](crate::ports::CounterStore).
//!
//! - [`FixedWindowCounter`]: one counter per key that expires with the window.
//!   Cheap, but lets a client spend its whole limit right after a rollover.
//! - [`SlidingWindowLog`]: one timestamped entry per admitted request,
//!   trimmed to the trailing window on every call. Smooths bursts at the cost
//!   of memory proportional to the limit.
//!
//! Neither strategy is atomic as a whole. Each store command is atomic on
//! its own, but concurrent runs for the same key can interleave between
//! round trips, so the limit may be overshot by up to the number of requests
//! in flight when it is crossed. This trades precision for one or two round
//! trips per check.

mod fixed_window;
mod sliding_window;

#[cfg(test)]
pub(crate) mod mock;

pub use fixed_window::FixedWindowCounter;
pub use sliding_window::SlidingWindowLog;

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::RateLimitError;
use crate::ports::StoreError;

/// `now + ttl`, clamped to the latest representable instant.
fn window_end(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Interpret an integer reply as a request count.
fn as_count(key: &str, command: &'static str, reply: i64) -> Result<u64, RateLimitError> {
    u64::try_from(reply).map_err(|_| {
        RateLimitError::store(
            key,
            command,
            StoreError::UnexpectedReply {
                command,
                reply: reply.to_string(),
            },
        )
    })
}
