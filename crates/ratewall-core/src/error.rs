//! Rate limiting errors.

use thiserror::Error;

use crate::ports::StoreError;

/// Errors returned by a [`Strategy`](crate::ports::Strategy).
///
/// Every failure carries the key being limited. Nothing is retried inside
/// the core; a caller seeing this error decides whether to fail open or
/// closed.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Store error for key {key} during {operation}: {source}")]
    Store {
        key: String,
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl RateLimitError {
    pub fn store(key: impl Into<String>, operation: &'static str, source: StoreError) -> Self {
        Self::Store {
            key: key.into(),
            operation,
            source,
        }
    }

    /// The key whose check failed.
    pub fn key(&self) -> &str {
        match self {
            Self::Store { key, .. } => key,
        }
    }

    /// The underlying store failure.
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::Store { source, .. } => source,
        }
    }
}
