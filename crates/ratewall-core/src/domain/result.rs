use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying [`RateLimitResult::total_requests`].
pub const RATE_LIMITING_TOTAL_REQUESTS: &str = "Rate-Limiting-Total-Requests";
/// Header carrying [`RateLimitResult::state`].
pub const RATE_LIMITING_STATE: &str = "Rate-Limiting-State";
/// Header carrying [`RateLimitResult::expires_at`] as RFC 3339.
pub const RATE_LIMITING_EXPIRES_AT: &str = "Rate-Limiting-Expires-At";

/// Verdict for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Allow,
    Deny,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Allow => f.write_str("Allow"),
            State::Deny => f.write_str("Deny"),
        }
    }
}

/// Outcome of running a strategy for one request.
///
/// `total_requests` is the number of requests attributed to the key in the
/// current window and `expires_at` is when that window is expected to roll
/// over. Everything an HTTP layer needs to answer the client is derivable
/// from this value alone, see [`RateLimitResult::headers`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub state: State,
    pub total_requests: u64,
    pub expires_at: DateTime<Utc>,
}

impl RateLimitResult {
    pub fn allow(total_requests: u64, expires_at: DateTime<Utc>) -> Self {
        Self {
            state: State::Allow,
            total_requests,
            expires_at,
        }
    }

    pub fn deny(total_requests: u64, expires_at: DateTime<Utc>) -> Self {
        Self {
            state: State::Deny,
            total_requests,
            expires_at,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.state == State::Allow
    }

    /// Requests left in the current window for the given limit.
    pub fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.total_requests)
    }

    /// Response headers describing this result.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (
                RATE_LIMITING_TOTAL_REQUESTS,
                self.total_requests.to_string(),
            ),
            (RATE_LIMITING_STATE, self.state.to_string()),
            (
                RATE_LIMITING_EXPIRES_AT,
                self.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_headers_render_all_fields() {
        let expires_at = Utc.with_ymd_and_hms(2020, 3, 25, 10, 16, 30).unwrap();
        let result = RateLimitResult::deny(101, expires_at);

        let headers = result.headers();
        assert_eq!(headers[0], (RATE_LIMITING_TOTAL_REQUESTS, "101".to_string()));
        assert_eq!(headers[1], (RATE_LIMITING_STATE, "Deny".to_string()));
        assert_eq!(
            headers[2],
            (RATE_LIMITING_EXPIRES_AT, "2020-03-25T10:16:30Z".to_string())
        );
    }

    #[test]
    fn test_remaining_saturates() {
        let now = Utc::now();
        assert_eq!(RateLimitResult::allow(40, now).remaining(100), 60);
        assert_eq!(RateLimitResult::deny(101, now).remaining(100), 0);
    }

    #[test]
    fn test_result_serializes_state_by_name() {
        let expires_at = Utc.with_ymd_and_hms(2020, 3, 25, 10, 16, 30).unwrap();
        let json = serde_json::to_value(RateLimitResult::allow(1, expires_at)).unwrap();
        assert_eq!(json["state"], "Allow");
        assert_eq!(json["total_requests"], 1);
    }
}
