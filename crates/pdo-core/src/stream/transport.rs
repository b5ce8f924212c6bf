//! Seam between the stream manager and whatever carries the bytes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Opens chunked connections.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Establish a connection carrying `payload` for `subject`. Resolves once
    /// the peer has accepted the stream; the body is read through the returned reader.
    async fn open(
        &self,
        subject: &str,
        payload: &serde_json::Value,
    ) -> Result<Box<dyn ChunkReader>, TransportError>;
}

/// Read side of an established stream.
#[async_trait]
pub trait ChunkReader: Send {
    /// Next chunk of body bytes; `Ok(None)` at end of stream.
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Abort the underlying transfer. Further reads may fail or end.
    fn cancel(&mut self);
}
