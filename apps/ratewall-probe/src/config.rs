//! Probe configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use ratewall_infra::{RateLimitConfig, RedisStoreConfig};

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Key the burst is charged against.
    pub key: String,
    /// Number of checks to fire.
    pub requests: u32,
    /// Pause between consecutive checks.
    pub interval: Duration,
    /// Deadline for each individual check.
    pub timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub store: RedisStoreConfig,
}

impl ProbeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            key: env::var("PROBE_KEY").unwrap_or_else(|_| "probe".to_string()),
            requests: env::var("PROBE_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            interval: Duration::from_millis(
                env::var("PROBE_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
            ),
            timeout: Duration::from_millis(
                env::var("PROBE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            rate_limit: RateLimitConfig::from_env(),
            store: RedisStoreConfig::from_env(),
        }
    }
}
