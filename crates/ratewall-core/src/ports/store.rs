//! Shared counter store port - the network key/value service holding all
//! rate limit state.
//!
//! The port is shaped around pipelined command batches: a [`Batch`] is sent
//! in one round trip and is *not* a transaction. A whole-batch failure means
//! the round trip itself failed; individual commands report their own
//! outcome through [`BatchReplies`]. Every reply is an integer, matching the
//! replies of `INCR`, `PTTL`, `PEXPIRE`, `ZADD`, `ZREMRANGEBYSCORE` and
//! `ZCOUNT`.

use std::time::Duration;

use async_trait::async_trait;

/// Shared counter store trait - abstraction over store backends (Redis, in-memory).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Send every command of `batch` in one round trip.
    async fn exec_batch(&self, batch: Batch) -> Result<BatchReplies, StoreError>;

    /// Run a single command.
    async fn exec(&self, command: Command) -> Result<i64, StoreError> {
        let mut batch = Batch::new();
        let slot = batch.push(command);
        self.exec_batch(batch).await?.get(slot)
    }
}

/// Store operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Command {command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        command: &'static str,
        reply: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

/// One end of a sorted-set score range. Scores are milliseconds since the
/// Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    NegInfinity,
    Inclusive(i64),
    Exclusive(i64),
    PosInfinity,
}

impl ScoreBound {
    /// Render in Redis range syntax: `-inf`, `42`, `(42`, `+inf`.
    pub fn to_redis_arg(&self) -> String {
        match self {
            ScoreBound::NegInfinity => "-inf".to_string(),
            ScoreBound::Inclusive(score) => score.to_string(),
            ScoreBound::Exclusive(score) => format!("({score}"),
            ScoreBound::PosInfinity => "+inf".to_string(),
        }
    }

    /// Whether `score` lies inside the range `[min, max]` described by the two bounds.
    pub fn range_contains(min: ScoreBound, max: ScoreBound, score: i64) -> bool {
        let above_min = match min {
            ScoreBound::NegInfinity => true,
            ScoreBound::Inclusive(bound) => score >= bound,
            ScoreBound::Exclusive(bound) => score > bound,
            ScoreBound::PosInfinity => false,
        };
        let below_max = match max {
            ScoreBound::NegInfinity => false,
            ScoreBound::Inclusive(bound) => score <= bound,
            ScoreBound::Exclusive(bound) => score < bound,
            ScoreBound::PosInfinity => true,
        };
        above_min && below_max
    }
}

/// A single store command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Increment a counter by one, creating it at zero without a TTL.
    Incr { key: String },
    /// Remaining time to live in milliseconds, `-1` without expiry, `-2` when missing.
    PTtl { key: String },
    /// Set the key's time to live.
    PExpire { key: String, ttl: Duration },
    /// Insert `member` into the sorted set with `score`.
    ZAdd {
        key: String,
        member: String,
        score: i64,
    },
    /// Remove sorted-set entries whose score lies in the range.
    ZRemRangeByScore {
        key: String,
        min: ScoreBound,
        max: ScoreBound,
    },
    /// Count sorted-set entries whose score lies in the range.
    ZCount {
        key: String,
        min: ScoreBound,
        max: ScoreBound,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Incr { .. } => "INCR",
            Command::PTtl { .. } => "PTTL",
            Command::PExpire { .. } => "PEXPIRE",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRemRangeByScore { .. } => "ZREMRANGEBYSCORE",
            Command::ZCount { .. } => "ZCOUNT",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Command::Incr { key }
            | Command::PTtl { key }
            | Command::PExpire { key, .. }
            | Command::ZAdd { key, .. }
            | Command::ZRemRangeByScore { key, .. }
            | Command::ZCount { key, .. } => key,
        }
    }
}

/// Decoded `PTTL` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    Expires(Duration),
}

impl KeyTtl {
    pub fn from_pttl(reply: i64) -> Self {
        match reply {
            -2 => KeyTtl::Missing,
            ms if ms < 0 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms as u64)),
        }
    }
}

/// Position of a command's reply inside [`BatchReplies`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplySlot(usize);

/// Ordered list of commands sent together in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) -> ReplySlot {
        self.commands.push(command);
        ReplySlot(self.commands.len() - 1)
    }

    pub fn incr(&mut self, key: &str) -> ReplySlot {
        self.push(Command::Incr {
            key: key.to_string(),
        })
    }

    pub fn pttl(&mut self, key: &str) -> ReplySlot {
        self.push(Command::PTtl {
            key: key.to_string(),
        })
    }

    pub fn pexpire(&mut self, key: &str, ttl: Duration) -> ReplySlot {
        self.push(Command::PExpire {
            key: key.to_string(),
            ttl,
        })
    }

    pub fn zadd(&mut self, key: &str, member: impl Into<String>, score: i64) -> ReplySlot {
        self.push(Command::ZAdd {
            key: key.to_string(),
            member: member.into(),
            score,
        })
    }

    pub fn zrem_range_by_score(&mut self, key: &str, min: ScoreBound, max: ScoreBound) -> ReplySlot {
        self.push(Command::ZRemRangeByScore {
            key: key.to_string(),
            min,
            max,
        })
    }

    pub fn zcount(&mut self, key: &str, min: ScoreBound, max: ScoreBound) -> ReplySlot {
        self.push(Command::ZCount {
            key: key.to_string(),
            min,
            max,
        })
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Per-command outcomes of a batch, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReplies {
    replies: Vec<Result<i64, StoreError>>,
}

impl BatchReplies {
    pub fn new(replies: Vec<Result<i64, StoreError>>) -> Self {
        Self { replies }
    }

    pub fn get(&self, slot: ReplySlot) -> Result<i64, StoreError> {
        self.replies
            .get(slot.0)
            .cloned()
            .unwrap_or_else(|| {
                Err(StoreError::UnexpectedReply {
                    command: "PIPELINE",
                    reply: format!("no reply at position {}", slot.0),
                })
            })
    }
}
