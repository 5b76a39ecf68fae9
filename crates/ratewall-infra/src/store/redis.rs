//! Redis counter store implementation using non-transactional pipelines.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Value};

use ratewall_core::ports::{Batch, BatchReplies, Command, CounterStore, StoreError};

use crate::config::RedisStoreConfig;

/// Redis-backed shared counter store.
///
/// Uses connection manager for automatic reconnection. A [`Batch`] is sent
/// as a plain pipeline (no `MULTI`/`EXEC`), so commands from other clients
/// may interleave with it. An error reply fails only its own command. The server's eviction policy (e.g.
/// `volatile-lru`) must be configured for keys of clients that keep getting
/// denied, since nothing refreshes their expiry.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisStoreConfig,
}

impl RedisCounterStore {
    pub async fn new(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.redis.url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.redis.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(
            url = %config.redis.url,
            key_prefix = ?config.key_prefix,
            "Connected to Redis counter store"
        );

        Ok(Self { conn, config })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisStoreConfig::from_env()).await
    }

    /// Test the Redis connection.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    fn make_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn pipeline(&self, commands: &[Command]) -> redis::Pipeline {
        let mut pipe = redis::pipe();

        for command in commands {
            let key = self.make_key(command.key());
            match command {
                Command::Incr { .. } => {
                    pipe.cmd("INCR").arg(key);
                }
                Command::PTtl { .. } => {
                    pipe.cmd("PTTL").arg(key);
                }
                Command::PExpire { ttl, .. } => {
                    // Round up so a sub-millisecond ttl never becomes a delete.
                    let millis =
                        u64::try_from(ttl.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX);
                    pipe.cmd("PEXPIRE").arg(key).arg(millis);
                }
                Command::ZAdd { member, score, .. } => {
                    pipe.cmd("ZADD").arg(key).arg(*score).arg(member);
                }
                Command::ZRemRangeByScore { min, max, .. } => {
                    pipe.cmd("ZREMRANGEBYSCORE")
                        .arg(key)
                        .arg(min.to_redis_arg())
                        .arg(max.to_redis_arg());
                }
                Command::ZCount { min, max, .. } => {
                    pipe.cmd("ZCOUNT")
                        .arg(key)
                        .arg(min.to_redis_arg())
                        .arg(max.to_redis_arg());
                }
            }
        }

        pipe
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn exec_batch(&self, batch: Batch) -> Result<BatchReplies, StoreError> {
        let commands = batch.into_commands();
        let pipe = self.pipeline(&commands);
        let mut conn = self.conn.clone();

        // Raw replies keep a server error in its own slot instead of failing
        // the whole pipeline.
        let values = conn
            .send_packed_commands(&pipe, 0, commands.len())
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, commands = commands.len(), "Redis pipeline failed");
                store_error(e)
            })?;

        if values.len() != commands.len() {
            return Err(StoreError::UnexpectedReply {
                command: "PIPELINE",
                reply: format!("{} replies for {} commands", values.len(), commands.len()),
            });
        }

        let replies = commands
            .iter()
            .zip(values)
            .map(|(command, value)| decode_reply(command, value))
            .collect();

        Ok(BatchReplies::new(replies))
    }
}

fn decode_reply(command: &Command, value: Value) -> Result<i64, StoreError> {
    match value {
        Value::ServerError(err) => Err(StoreError::Command {
            command: command.name(),
            message: match err.details() {
                Some(details) => format!("{} {}", err.code(), details),
                None => err.code().to_string(),
            },
        }),
        value => redis::from_owned_redis_value::<i64>(value).map_err(|e| StoreError::Command {
            command: command.name(),
            message: e.to_string(),
        }),
    }
}

fn store_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command {
            command: "PIPELINE",
            message: e.to_string(),
        }
    }
}
