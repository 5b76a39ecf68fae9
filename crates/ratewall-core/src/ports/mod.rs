//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod clock;
mod rate_limit;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::Strategy;
pub use store::{
    Batch, BatchReplies, Command, CounterStore, KeyTtl, ReplySlot, ScoreBound, StoreError,
};
