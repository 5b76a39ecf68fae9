//! # Ratewall Core
//!
//! The domain layer of Ratewall.
//! This crate holds the request/result model, the ports a shared counter
//! store must implement, and the two counting strategies built on top of
//! them. It has no network dependencies; concrete stores live in
//! `ratewall-infra`.

pub mod context;
pub mod domain;
pub mod error;
pub mod ports;
pub mod strategies;

pub use context::RunContext;
pub use domain::{RateLimitRequest, RateLimitResult, State};
pub use error::RateLimitError;
pub use ports::{Clock, CounterStore, ManualClock, Strategy, StoreError, SystemClock};
pub use strategies::{FixedWindowCounter, SlidingWindowLog};
