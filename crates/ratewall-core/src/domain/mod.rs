//! Domain model - the values exchanged between callers and strategies.

mod request;
mod result;

pub use request::RateLimitRequest;
pub use result::{
    RATE_LIMITING_EXPIRES_AT, RATE_LIMITING_STATE, RATE_LIMITING_TOTAL_REQUESTS, RateLimitResult,
    State,
};
