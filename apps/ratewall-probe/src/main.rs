//! # Ratewall Probe
//!
//! Fires a burst of checks for one key against the configured store and
//! prints every verdict as a JSON line on stdout.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use ratewall_core::{CounterStore, RateLimitResult, RunContext, SystemClock};
use ratewall_infra::{InMemoryCounterStore, RedisStoreConfig, build_strategy};

mod config;
mod telemetry;

use config::ProbeConfig;
use telemetry::TelemetryConfig;

#[derive(Serialize)]
struct Verdict<'a> {
    attempt: u32,
    key: &'a str,
    limit: u64,
    remaining: u64,
    #[serde(flatten)]
    result: &'a RateLimitResult,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = ProbeConfig::from_env();

    tracing::info!(
        key = %config.key,
        algorithm = %config.rate_limit.algorithm,
        limit = config.rate_limit.limit,
        window_secs = config.rate_limit.window.as_secs(),
        requests = config.requests,
        "Starting Ratewall probe"
    );

    let store = connect_store(&config.store).await?;
    let strategy = build_strategy(config.rate_limit.algorithm, store, Arc::new(SystemClock));
    let request = config.rate_limit.request(config.key.as_str());

    for attempt in 1..=config.requests {
        let ctx = RunContext::with_timeout(config.timeout);
        let result = match strategy.run(&ctx, &request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, attempt, "Rate limit check failed");
                return Err(e).context("rate limit check failed");
            }
        };

        let verdict = Verdict {
            attempt,
            key: &request.key,
            limit: request.limit,
            remaining: result.remaining(request.limit),
            result: &result,
        };
        println!("{}", serde_json::to_string(&verdict)?);

        if !config.interval.is_zero() && attempt < config.requests {
            tokio::time::sleep(config.interval).await;
        }
    }

    Ok(())
}

#[cfg(feature = "redis")]
async fn connect_store(config: &RedisStoreConfig) -> anyhow::Result<Arc<dyn CounterStore>> {
    use ratewall_infra::RedisCounterStore;

    match RedisCounterStore::new(config.clone()).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) if config.redis.fallback_to_memory => {
            tracing::warn!(
                error = %e,
                "Redis unavailable, falling back to in-memory store"
            );
            Ok(Arc::new(InMemoryCounterStore::new()))
        }
        Err(e) => Err(e).context("failed to connect to Redis"),
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_store(_config: &RedisStoreConfig) -> anyhow::Result<Arc<dyn CounterStore>> {
    tracing::info!("Built without Redis support, using in-memory store");
    Ok(Arc::new(InMemoryCounterStore::new()))
}
