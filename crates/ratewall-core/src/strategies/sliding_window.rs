//! Sliding-window log strategy.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{as_count, window_end};
use crate::context::RunContext;
use crate::domain::{RateLimitRequest, RateLimitResult};
use crate::error::RateLimitError;
use crate::ports::{Batch, Clock, Command, CounterStore, ScoreBound, Strategy};

/// One sorted-set entry per admitted request, scored by its timestamp in
/// milliseconds.
///
/// A run first counts the entries inside `[now - duration, +inf)` without
/// writing anything. A client already at its limit is denied right there, so
/// a saturated client cannot grow its set by hammering the limiter. Otherwise
/// a single pipeline trims entries older than the window, inserts a fresh
/// UUID scored `now`, refreshes the set's expiry and counts what is left.
/// That post-insert count is what decides admission, so the request that
/// pushes the count past the limit is the one denied.
///
/// Old entries are only trimmed when a new request for the key comes in. The
/// expiry refreshed on every admitted request lets an idle key's set lapse
/// one window after its last admission; a client that keeps getting denied
/// never refreshes it, and the store's own eviction policy is the backstop
/// for that case.
pub struct SlidingWindowLog {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLog {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl Strategy for SlidingWindowLog {
    async fn run(
        &self,
        ctx: &RunContext,
        request: &RateLimitRequest,
    ) -> Result<RateLimitResult, RateLimitError> {
        let key = request.key.as_str();
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let window_ms = i64::try_from(request.duration.as_millis()).unwrap_or(i64::MAX);
        let window_start = now_ms.saturating_sub(window_ms);
        let expires_at = window_end(now, request.duration);

        let in_window = ctx
            .guard(self.store.exec(Command::ZCount {
                key: key.to_string(),
                min: ScoreBound::Inclusive(window_start),
                max: ScoreBound::PosInfinity,
            }))
            .await
            .map_err(|e| RateLimitError::store(key, "ZCOUNT", e))?;
        let in_window = as_count(key, "ZCOUNT", in_window)?;

        if in_window >= request.limit {
            tracing::warn!(
                key = %key,
                total_requests = in_window,
                limit = request.limit,
                "Rate limit exceeded (sliding window)"
            );
            return Ok(RateLimitResult::deny(in_window, expires_at));
        }

        let mut batch = Batch::new();
        let trim = batch.zrem_range_by_score(
            key,
            ScoreBound::NegInfinity,
            ScoreBound::Exclusive(window_start),
        );
        let add = batch.zadd(key, Uuid::new_v4().to_string(), now_ms);
        let expire = batch.pexpire(key, request.duration);
        let count = batch.zcount(key, ScoreBound::NegInfinity, ScoreBound::PosInfinity);

        let replies = ctx
            .guard(self.store.exec_batch(batch))
            .await
            .map_err(|e| RateLimitError::store(key, "sliding window pipeline", e))?;

        replies
            .get(trim)
            .map_err(|e| RateLimitError::store(key, "ZREMRANGEBYSCORE", e))?;
        replies
            .get(add)
            .map_err(|e| RateLimitError::store(key, "ZADD", e))?;
        replies
            .get(expire)
            .map_err(|e| RateLimitError::store(key, "PEXPIRE", e))?;
        let total = replies
            .get(count)
            .map_err(|e| RateLimitError::store(key, "ZCOUNT", e))?;
        let total_requests = as_count(key, "ZCOUNT", total)?;

        if total_requests > request.limit {
            tracing::warn!(
                key = %key,
                total_requests,
                limit = request.limit,
                "Rate limit exceeded (sliding window)"
            );
            return Ok(RateLimitResult::deny(total_requests, expires_at));
        }

        tracing::debug!(key = %key, total_requests, limit = request.limit, "Request allowed");
        Ok(RateLimitResult::allow(total_requests, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::State;
    use crate::ports::StoreError;
    use crate::strategies::mock::ScriptedStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 3, 25, 10, 15, 30).unwrap()
    }

    fn log(store: &Arc<ScriptedStore>) -> SlidingWindowLog {
        let now = t0();
        SlidingWindowLog::new(store.clone(), Arc::new(move || now))
    }

    fn request(limit: u64) -> RateLimitRequest {
        RateLimitRequest::new("some-user", limit, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_saturated_key_is_denied_without_writes() {
        let store = Arc::new(ScriptedStore::new().append_replies(vec![Ok(100)]));

        let result = log(&store)
            .run(&RunContext::background(), &request(100))
            .await
            .unwrap();

        assert_eq!(result.state, State::Deny);
        assert_eq!(result.total_requests, 100);
        assert_eq!(result.expires_at, t0() + chrono::Duration::seconds(60));

        let sent = store.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            vec![Command::ZCount {
                key: "some-user".to_string(),
                min: ScoreBound::Inclusive(t0().timestamp_millis() - 60_000),
                max: ScoreBound::PosInfinity,
            }]
        );
    }

    #[tokio::test]
    async fn test_pipeline_trims_inserts_and_counts() {
        let store = Arc::new(
            ScriptedStore::new()
                .append_replies(vec![Ok(4)])
                .append_replies(vec![Ok(2), Ok(1), Ok(1), Ok(5)]),
        );

        let result = log(&store)
            .run(&RunContext::background(), &request(10))
            .await
            .unwrap();

        assert_eq!(result.state, State::Allow);
        assert_eq!(result.total_requests, 5);

        let now_ms = t0().timestamp_millis();
        let sent = store.sent();
        let pipeline = &sent[1];
        assert_eq!(pipeline.len(), 4);
        assert_eq!(
            pipeline[0],
            Command::ZRemRangeByScore {
                key: "some-user".to_string(),
                min: ScoreBound::NegInfinity,
                max: ScoreBound::Exclusive(now_ms - 60_000),
            }
        );
        match &pipeline[1] {
            Command::ZAdd { member, score, .. } => {
                assert_eq!(*score, now_ms);
                assert!(Uuid::parse_str(member).is_ok());
            }
            other => panic!("expected ZADD, got {other:?}"),
        }
        assert_eq!(
            pipeline[2],
            Command::PExpire {
                key: "some-user".to_string(),
                ttl: Duration::from_secs(60),
            }
        );
        assert_eq!(
            pipeline[3],
            Command::ZCount {
                key: "some-user".to_string(),
                min: ScoreBound::NegInfinity,
                max: ScoreBound::PosInfinity,
            }
        );
    }

    #[tokio::test]
    async fn test_post_insert_count_over_limit_is_denied() {
        // Another caller slipped in between the pre-check and the pipeline.
        let store = Arc::new(
            ScriptedStore::new()
                .append_replies(vec![Ok(9)])
                .append_replies(vec![Ok(0), Ok(1), Ok(1), Ok(11)]),
        );

        let result = log(&store)
            .run(&RunContext::background(), &request(10))
            .await
            .unwrap();

        assert_eq!(result.state, State::Deny);
        assert_eq!(result.total_requests, 11);
    }

    #[tokio::test]
    async fn test_tokens_are_unique_per_call() {
        let store = Arc::new(
            ScriptedStore::new()
                .append_replies(vec![Ok(0)])
                .append_replies(vec![Ok(0), Ok(1), Ok(1), Ok(1)])
                .append_replies(vec![Ok(1)])
                .append_replies(vec![Ok(0), Ok(1), Ok(1), Ok(2)]),
        );
        let limiter = log(&store);

        limiter.run(&RunContext::background(), &request(10)).await.unwrap();
        limiter.run(&RunContext::background(), &request(10)).await.unwrap();

        let sent = store.sent();
        let member = |commands: &[Command]| match &commands[1] {
            Command::ZAdd { member, .. } => member.clone(),
            other => panic!("expected ZADD, got {other:?}"),
        };
        assert_ne!(member(sent[1].as_slice()), member(sent[3].as_slice()));
    }

    #[tokio::test]
    async fn test_precheck_failure_is_store_error() {
        let store = Arc::new(
            ScriptedStore::new().append_failure(StoreError::Connection("refused".to_string())),
        );

        let err = log(&store)
            .run(&RunContext::background(), &request(10))
            .await
            .unwrap_err();

        assert!(matches!(err, RateLimitError::Store { operation: "ZCOUNT", .. }));
        assert_eq!(store.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_pipeline_failure_is_store_error() {
        let store = Arc::new(
            ScriptedStore::new()
                .append_replies(vec![Ok(0)])
                .append_replies(vec![
                    Ok(0),
                    Err(StoreError::Command {
                        command: "ZADD",
                        message: "OOM command not allowed".to_string(),
                    }),
                    Ok(0),
                    Ok(0),
                ]),
        );

        let err = log(&store)
            .run(&RunContext::background(), &request(10))
            .await
            .unwrap_err();

        assert_eq!(err.key(), "some-user");
        assert!(matches!(err, RateLimitError::Store { operation: "ZADD", .. }));
    }

    #[tokio::test]
    async fn test_whole_pipeline_failure_is_store_error() {
        let store = Arc::new(
            ScriptedStore::new()
                .append_replies(vec![Ok(0)])
                .append_failure(StoreError::Connection("broken pipe".to_string())),
        );

        let err = log(&store)
            .run(&RunContext::background(), &request(10))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RateLimitError::Store {
                operation: "sliding window pipeline",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_limit_denies_without_writes() {
        let store = Arc::new(ScriptedStore::new().append_replies(vec![Ok(0)]));

        let result = log(&store)
            .run(&RunContext::background(), &request(0))
            .await
            .unwrap();

        assert_eq!(result.state, State::Deny);
        assert_eq!(result.total_requests, 0);
        assert_eq!(store.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_precheck_sends_no_pipeline() {
        let token = CancellationToken::new();
        let store = Arc::new(
            ScriptedStore::new()
                .append_replies(vec![Ok(0)])
                .append_replies(vec![Ok(0), Ok(1), Ok(1), Ok(1)])
                .cancelling(token.clone()),
        );

        let err = log(&store)
            .run(&RunContext::with_cancellation(token), &request(10))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RateLimitError::Store {
                operation: "sliding window pipeline",
                ..
            }
        ));
        assert_eq!(err.store_error(), &StoreError::Cancelled);
        assert_eq!(store.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_precheck_hits_deadline() {
        let store = Arc::new(
            ScriptedStore::new()
                .append_replies(vec![Ok(0)])
                .with_delay(Duration::from_secs(1)),
        );
        let ctx = RunContext::with_timeout(Duration::from_millis(50));

        let err = log(&store).run(&ctx, &request(10)).await.unwrap_err();

        assert!(matches!(err, RateLimitError::Store { operation: "ZCOUNT", .. }));
        assert_eq!(err.store_error(), &StoreError::DeadlineExceeded);
        assert_eq!(store.sent().len(), 1);
    }
}
