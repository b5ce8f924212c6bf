//! Long-lived chunked streams with bounded reconnect on establishment.

mod decoder;
mod manager;
mod registry;
mod transport;
mod wire;

pub use decoder::ChunkDecoder;
pub use manager::{StreamManager, StreamObserver};
pub use registry::{DeliveryGate, StreamEntry, StreamInfo, StreamRegistry, StreamStatus};
pub use transport::{ChunkReader, StreamTransport};
pub use wire::{parse_line, StreamChunk, DATA_MARKER};
