//! # Ratewall Infrastructure
//!
//! Concrete implementations of the ports defined in `ratewall-core`.
//!
//! ## Feature Flags
//!
//! - `redis` (default) - Redis-backed shared counter store
//! - `minimal` - No external dependencies, in-memory store only

pub mod config;
pub mod store;

pub use config::{
    Algorithm, ConfigError, RateLimitConfig, RedisConfig, RedisStoreConfig, build_strategy,
};
pub use store::InMemoryCounterStore;

#[cfg(feature = "redis")]
pub use store::RedisCounterStore;
