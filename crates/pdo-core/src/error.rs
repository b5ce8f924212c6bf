//! Error types shared by the loader and the stream layer.

use thiserror::Error;

use crate::ids::SessionId;

/// A single phase fetch failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Backend answered with a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// libcurl reported a transfer failure.
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    /// Body was not valid JSON.
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    /// Blocking fetch task panicked or was cancelled.
    #[error("fetch task: {0}")]
    Task(String),
    /// Any other failure reported by a fetcher.
    #[error("{0}")]
    Failed(String),
}

impl FetchError {
    pub fn failed(msg: impl Into<String>) -> Self {
        FetchError::Failed(msg.into())
    }
}

/// Errors surfaced to the caller of `PhaseScheduler::start_session`.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The critical (first) phase failed; no deferred phase was started.
    #[error("session {session_id}: critical phase '{phase}' failed: {source}")]
    CriticalPhase {
        session_id: SessionId,
        phase: String,
        #[source]
        source: FetchError,
    },
    /// Two phases in a table share a name.
    #[error("duplicate phase name '{0}'")]
    DuplicatePhase(String),
}

/// Failure of a stream transport, either while connecting or mid-stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established (refused, DNS, reset).
    #[error("connect: {0}")]
    Connect(String),
    /// Connect or read timed out.
    #[error("timed out")]
    Timeout,
    /// Server answered the stream request with a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// libcurl reported a transfer failure.
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    /// Reading the body failed after the stream was established.
    #[error("read: {0}")]
    Read(String),
    /// The request could not be built (e.g. payload encoding).
    #[error("request: {0}")]
    Request(String),
    /// The transfer was aborted locally.
    #[error("cancelled")]
    Cancelled,
}

/// A backend base URL that cannot be used to build endpoints.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid base URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("base URL cannot carry a path: {0}")]
    NotABase(String),
}

/// Terminal failure of a stream, reported to observers and on the event bus.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Every connection attempt failed; `source` is the last error.
    #[error("connection failed after {attempts} attempt(s): {source}")]
    ConnectFailed {
        attempts: u32,
        #[source]
        source: TransportError,
    },
    /// The established stream failed while reading. Not retried.
    #[error("stream read failed: {0}")]
    Read(#[source] TransportError),
}
