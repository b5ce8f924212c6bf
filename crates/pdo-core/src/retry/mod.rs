//! Reconnect backoff policy.
//!
//! Every failed connection attempt is retried with exponential backoff up to
//! the attempt cap; only a local cancel ends the loop early.

mod classify;
mod policy;
mod run;

pub use classify::classify;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
