//! In-memory counter store - used as fallback when Redis is unavailable and
//! as the deterministic backend in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use ratewall_core::ports::{Batch, BatchReplies, Command, CounterStore, ScoreBound, StoreError};
use ratewall_core::{Clock, SystemClock};

enum Value {
    Counter(i64),
    /// member -> score
    SortedSet(HashMap<String, i64>),
}

struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-local store mirroring the Redis semantics the strategies rely on.
///
/// Keys expire lazily against the injected clock, so a test can advance a
/// [`ManualClock`](ratewall_core::ManualClock) past a window instead of
/// sleeping. Like Redis, a key is gone once the clock is strictly past its
/// expiry instant. A batch runs in order under a single lock.
///
/// Expiry only runs when a key is accessed, so a key that is never touched
/// again keeps its entry in the map until the process exits.
///
/// Note: state is per process and lost on restart, so limits are not shared
/// across instances.
pub struct InMemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Whether `key` currently holds unexpired state.
    pub async fn contains_key(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        purge_if_expired(&mut entries, key, self.clock.now());
        entries.contains_key(key)
    }

    fn apply(
        entries: &mut HashMap<String, Entry>,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let name = command.name();
        purge_if_expired(entries, command.key(), now);

        match command {
            Command::Incr { key } => {
                let entry = entries.entry(key).or_insert(Entry {
                    value: Value::Counter(0),
                    expires_at: None,
                });
                match &mut entry.value {
                    Value::Counter(count) => {
                        *count = count.checked_add(1).ok_or_else(|| StoreError::Command {
                            command: name,
                            message: "increment or decrement would overflow".to_string(),
                        })?;
                        Ok(*count)
                    }
                    Value::SortedSet(_) => Err(wrong_type(name)),
                }
            }
            Command::PTtl { key } => Ok(match entries.get(&key) {
                None => -2,
                Some(Entry {
                    expires_at: None, ..
                }) => -1,
                Some(Entry {
                    expires_at: Some(at),
                    ..
                }) => (*at - now).num_milliseconds().max(0),
            }),
            Command::PExpire { key, ttl } => {
                if !entries.contains_key(&key) {
                    return Ok(0);
                }
                if ttl.is_zero() {
                    entries.remove(&key);
                } else if let Some(entry) = entries.get_mut(&key) {
                    entry.expires_at = Some(deadline(now, ttl));
                }
                Ok(1)
            }
            Command::ZAdd { key, member, score } => {
                let entry = entries.entry(key).or_insert(Entry {
                    value: Value::SortedSet(HashMap::new()),
                    expires_at: None,
                });
                match &mut entry.value {
                    Value::SortedSet(set) => Ok(match set.insert(member, score) {
                        Some(_) => 0,
                        None => 1,
                    }),
                    Value::Counter(_) => Err(wrong_type(name)),
                }
            }
            Command::ZRemRangeByScore { key, min, max } => {
                let Some(entry) = entries.get_mut(&key) else {
                    return Ok(0);
                };
                let Value::SortedSet(set) = &mut entry.value else {
                    return Err(wrong_type(name));
                };
                let before = set.len();
                set.retain(|_, score| !ScoreBound::range_contains(min, max, *score));
                let removed = before - set.len();
                if set.is_empty() {
                    entries.remove(&key);
                }
                Ok(removed as i64)
            }
            Command::ZCount { key, min, max } => match entries.get(&key) {
                None => Ok(0),
                Some(Entry {
                    value: Value::SortedSet(set),
                    ..
                }) => Ok(set
                    .values()
                    .filter(|score| ScoreBound::range_contains(min, max, **score))
                    .count() as i64),
                Some(_) => Err(wrong_type(name)),
            },
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn exec_batch(&self, batch: Batch) -> Result<BatchReplies, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;

        let replies = batch
            .into_commands()
            .into_iter()
            .map(|command| Self::apply(&mut entries, command, now))
            .collect();

        Ok(BatchReplies::new(replies))
    }
}

fn purge_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: DateTime<Utc>) {
    let expired = entries
        .get(key)
        .and_then(|entry| entry.expires_at)
        .is_some_and(|at| now > at);
    if expired {
        entries.remove(key);
    }
}

fn deadline(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn wrong_type(command: &'static str) -> StoreError {
    StoreError::Command {
        command,
        message: "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    }
}
