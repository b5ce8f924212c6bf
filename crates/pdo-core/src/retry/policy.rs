use std::time::Duration;

/// Why a connection attempt failed. Every kind but `Cancelled` is retried
/// until the attempt cap; the kind only shapes logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or response timeout (curl timeout, 408).
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Refused, reset, DNS or transfer-level failure.
    Connection,
    /// Any other non-2xx establishment status.
    Status(u16),
    /// Request could not be built (payload encoding).
    Request,
    /// Aborted locally; never retried.
    Cancelled,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff: the delay after failed attempt `k` is `base * 2^(k-1)`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay following failed attempt `attempt` (1-based), ignoring the attempt cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// Decide what to do after attempt `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Cancelled => RetryDecision::NoRetry,
            _ => RetryDecision::RetryAfter(self.backoff(attempt)),
        }
    }
}
