//! Stream lifecycle: connect with backoff, pump chunks, tear down.
//!
//! Connection establishment is retried per [`RetryPolicy`]. Once a stream
//! is up, a spawned task reads chunks, decodes lines and dispatches parsed
//! messages until the transport ends, fails, or the stream is closed.
//! Mid-stream failures are terminal; callers open a fresh stream.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::StreamError;
use crate::events::{Event, EventBus};
use crate::ids::StreamId;
use crate::retry::{run_with_retry, RetryPolicy};

use super::decoder::ChunkDecoder;
use super::registry::{DeliveryGate, StreamEntry, StreamInfo, StreamRegistry, StreamStatus};
use super::transport::{ChunkReader, StreamTransport};
use super::wire::{parse_line, StreamChunk};

/// Caller-supplied callbacks for one stream. All methods default to no-ops.
pub trait StreamObserver: Send + Sync {
    fn on_message(&self, _stream_id: &StreamId, _chunk: &StreamChunk) {}
    fn on_error(&self, _stream_id: &StreamId, _error: &StreamError) {}
    fn on_complete(&self, _stream_id: &StreamId) {}
}

impl StreamObserver for () {}

struct Shared {
    transport: Arc<dyn StreamTransport>,
    registry: Mutex<StreamRegistry>,
    bus: EventBus,
    policy: RetryPolicy,
}

impl Shared {
    /// Remove the entry with a final status. Returns false if it was already
    /// gone (closed), in which case the caller must not report anything.
    fn finish(&self, stream_id: &StreamId, status: StreamStatus) -> bool {
        let Some(entry) = self.registry.lock().remove(stream_id) else {
            return false;
        };
        tracing::info!(
            stream_id = %stream_id,
            ?status,
            duration_ms = entry.started_at.elapsed().as_millis() as u64,
            "stream finished"
        );
        true
    }

    fn fail(&self, stream_id: &StreamId, error: &StreamError, observer: &dyn StreamObserver) {
        tracing::warn!(stream_id = %stream_id, "stream error: {}", error);
        observer.on_error(stream_id, error);
        self.bus.publish(Event::StreamError {
            stream_id: stream_id.clone(),
            error: error.to_string(),
        });
    }

    /// Parse and dispatch one line. False once the gate is closed.
    fn deliver(
        &self,
        stream_id: &StreamId,
        line: &str,
        gate: &DeliveryGate,
        observer: &dyn StreamObserver,
    ) -> bool {
        let Some(chunk) = parse_line(line) else {
            return !gate.is_closed();
        };
        gate.pass(|| {
            observer.on_message(stream_id, &chunk);
            self.bus.publish(Event::StreamMessage {
                stream_id: stream_id.clone(),
                chunk,
            });
        })
        .is_some()
    }
}

/// Owns the one registry of active streams. Cloneable; pass it to whoever
/// needs to open or close streams.
#[derive(Clone)]
pub struct StreamManager {
    shared: Arc<Shared>,
}

impl StreamManager {
    pub fn new(transport: Arc<dyn StreamTransport>, bus: EventBus, policy: RetryPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                registry: Mutex::new(StreamRegistry::new()),
                bus,
                policy,
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Open a stream. `None` means it could not be started; the last
    /// connection error has already gone to `observer.on_error`.
    pub async fn open(
        &self,
        subject: &str,
        payload: serde_json::Value,
        observer: Arc<dyn StreamObserver>,
    ) -> Option<StreamId> {
        self.connect(subject, payload, observer).await.ok()
    }

    /// Like [`StreamManager::open`], returning the failure as well.
    pub async fn connect(
        &self,
        subject: &str,
        payload: serde_json::Value,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<StreamId, StreamError> {
        let stream_id = StreamId::generate(subject);
        let connected = run_with_retry(&self.shared.policy, |attempt| {
            let transport = Arc::clone(&self.shared.transport);
            let subject = subject.to_owned();
            let payload = payload.clone();
            async move {
                tracing::debug!(subject = %subject, attempt, "opening stream connection");
                transport.open(&subject, &payload).await
            }
        })
        .await;

        let reader = match connected {
            Ok(reader) => reader,
            Err(e) => {
                self.shared.fail(&stream_id, &e, observer.as_ref());
                return Err(e);
            }
        };

        let gate = DeliveryGate::new();
        self.shared.registry.lock().add(StreamEntry {
            id: stream_id.clone(),
            subject: subject.to_owned(),
            started_at: Instant::now(),
            gate: gate.clone(),
        });
        tracing::info!(stream_id = %stream_id, subject, "stream established");

        tokio::spawn(pump(
            Arc::clone(&self.shared),
            stream_id.clone(),
            reader,
            gate,
            observer,
        ));
        Ok(stream_id)
    }

    /// Cancel the stream's read and forget it. Idempotent; false if unknown.
    /// No message for the stream is delivered after this returns.
    pub fn close(&self, stream_id: &StreamId) -> bool {
        let Some(entry) = self.shared.registry.lock().remove(stream_id) else {
            return false;
        };
        entry.gate.close();
        tracing::info!(
            stream_id = %stream_id,
            status = ?StreamStatus::Cancelled,
            "stream closed"
        );
        true
    }

    /// Close every active stream. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let entries = self.shared.registry.lock().drain();
        for entry in &entries {
            entry.gate.close();
        }
        if !entries.is_empty() {
            tracing::info!(count = entries.len(), "closed all streams");
        }
        entries.len()
    }

    /// Active streams, oldest first.
    pub fn active(&self) -> Vec<StreamInfo> {
        self.shared.registry.lock().all()
    }

    pub fn is_active(&self, stream_id: &StreamId) -> bool {
        self.shared.registry.lock().get(stream_id).is_some()
    }
}

async fn pump(
    shared: Arc<Shared>,
    stream_id: StreamId,
    mut reader: Box<dyn ChunkReader>,
    gate: DeliveryGate,
    observer: Arc<dyn StreamObserver>,
) {
    let mut decoder = ChunkDecoder::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = gate.closed() => {
                reader.cancel();
                tracing::debug!(stream_id = %stream_id, "stream read cancelled");
                return;
            }
            next = reader.read_chunk() => next,
        };

        match next {
            Ok(Some(bytes)) => {
                for line in decoder.push(&bytes) {
                    if !shared.deliver(&stream_id, &line, &gate, observer.as_ref()) {
                        reader.cancel();
                        return;
                    }
                }
            }
            Ok(None) => {
                if let Some(line) = decoder.finish() {
                    if !shared.deliver(&stream_id, &line, &gate, observer.as_ref()) {
                        return;
                    }
                }
                if shared.finish(&stream_id, StreamStatus::Completed) {
                    observer.on_complete(&stream_id);
                    shared.bus.publish(Event::StreamComplete {
                        stream_id: stream_id.clone(),
                    });
                }
                return;
            }
            Err(e) => {
                if shared.finish(&stream_id, StreamStatus::Errored) {
                    shared.fail(&stream_id, &StreamError::Read(e), observer.as_ref());
                }
                return;
            }
        }
    }
}
