//! Configuration loaded from environment variables, and strategy selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ratewall_core::strategies::{FixedWindowCounter, SlidingWindowLog};
use ratewall_core::{Clock, CounterStore, RateLimitRequest, Strategy};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown rate limit algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Counting algorithm to run against the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Counter that resets when its TTL lapses.
    FixedWindow,
    /// Timestamped log trimmed to the trailing window.
    #[default]
    SlidingWindow,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::FixedWindow => f.write_str("fixed_window"),
            Algorithm::SlidingWindow => f.write_str("sliding_window"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fixed_window" | "fixed" | "counter" => Ok(Algorithm::FixedWindow),
            "sliding_window" | "sliding" | "sorted_set" => Ok(Algorithm::SlidingWindow),
            other => Err(ConfigError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Build the strategy for `algorithm` on top of `store`.
pub fn build_strategy(
    algorithm: Algorithm,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn Strategy> {
    match algorithm {
        Algorithm::FixedWindow => Arc::new(FixedWindowCounter::new(store, clock)),
        Algorithm::SlidingWindow => Arc::new(SlidingWindowLog::new(store, clock)),
    }
}

/// Rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub algorithm: Algorithm,
    /// Maximum requests per window.
    pub limit: u64,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            limit: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            algorithm: std::env::var("RATE_LIMIT_ALGORITHM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            limit: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            window: Duration::from_secs(
                std::env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }

    /// Request for `key` under this configuration.
    pub fn request(&self, key: impl Into<String>) -> RateLimitRequest {
        RateLimitRequest::new(key, self.limit, self.window)
    }
}

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fall back to the in-memory store if Redis is unavailable
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: false,
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Redis counter store configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Prefix prepended to every rate limit key, joined with `:`
    pub key_prefix: Option<String>,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            key_prefix: Some("ratelimit".to_string()),
        }
    }
}

impl RedisStoreConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            key_prefix: match std::env::var("RATE_LIMIT_KEY_PREFIX") {
                Ok(prefix) if prefix.is_empty() => None,
                Ok(prefix) => Some(prefix),
                Err(_) => Some("ratelimit".to_string()),
            },
        }
    }
}
