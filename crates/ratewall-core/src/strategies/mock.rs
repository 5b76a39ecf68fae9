//! Scripted store for strategy unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::ports::{Batch, BatchReplies, Command, CounterStore, StoreError};

/// Store that answers each round trip with the next scripted result and
/// records what it was sent.
#[derive(Default)]
pub(crate) struct ScriptedStore {
    results: Mutex<VecDeque<Result<BatchReplies, StoreError>>>,
    sent: Mutex<Vec<Vec<Command>>>,
    cancel_on_call: Option<CancellationToken>,
    delay: Option<Duration>,
}

impl ScriptedStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the replies for the next round trip.
    pub(crate) fn append_replies(self, replies: Vec<Result<i64, StoreError>>) -> Self {
        self.results
            .lock()
            .unwrap()
            .push_back(Ok(BatchReplies::new(replies)));
        self
    }

    /// Queue a failure of the whole next round trip.
    pub(crate) fn append_failure(self, error: StoreError) -> Self {
        self.results.lock().unwrap().push_back(Err(error));
        self
    }

    /// Cancel `token` whenever a round trip arrives, then answer it anyway.
    pub(crate) fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    /// Take `delay` to answer each round trip.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Commands of every round trip received so far.
    pub(crate) fn sent(&self) -> Vec<Vec<Command>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl CounterStore for ScriptedStore {
    async fn exec_batch(&self, batch: Batch) -> Result<BatchReplies, StoreError> {
        self.sent.lock().unwrap().push(batch.into_commands());
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StoreError::Connection("script exhausted".to_string())))
    }
}
