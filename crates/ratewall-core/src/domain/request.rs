use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A request to be checked against a rate limit.
///
/// `key` identifies the calling client (account ID, API key, forwarded IP...)
/// and must be stable across calls from that client. `limit` is how many
/// requests the client may make per `duration`; a limit of zero denies
/// everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRequest {
    pub key: String,
    pub limit: u64,
    pub duration: Duration,
}

impl RateLimitRequest {
    pub fn new(key: impl Into<String>, limit: u64, duration: Duration) -> Self {
        Self {
            key: key.into(),
            limit,
            duration,
        }
    }
}
