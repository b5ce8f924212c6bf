//! Retry loop: run an async connect closure until success or policy says stop.

use std::future::Future;

use super::classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::error::{StreamError, TransportError};

/// Runs `f(attempt)` until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// The returned error carries the number of attempts made and the last error.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, StreamError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        return Err(StreamError::ConnectFailed {
                            attempts: attempt,
                            source: e,
                        })
                    }
                    RetryDecision::RetryAfter(d) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = d.as_millis() as u64,
                            kind = ?kind,
                            "connect failed, retrying: {}",
                            e
                        );
                        tokio::time::sleep(d).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}
