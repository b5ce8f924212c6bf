pub mod config;
pub mod logging;

pub mod error;
pub mod events;
pub mod http;
pub mod ids;
pub mod network;
pub mod perf;
pub mod retry;
pub mod session;
pub mod stream;

/// Structured body delivered by a phase fetch.
pub type Payload = serde_json::Value;
