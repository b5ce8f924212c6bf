//! Bookkeeping of active streams.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ids::StreamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Active,
    Completed,
    Errored,
    Cancelled,
}

/// Shutter between a stream's reader task and whoever closes it.
///
/// Each delivery runs with the gate held, and [`DeliveryGate::close`] takes
/// the same lock, so once `close` returns nothing more is delivered. The
/// lock is reentrant: an observer may close its own stream mid-delivery.
#[derive(Debug, Clone)]
pub struct DeliveryGate {
    lock: Arc<ReentrantMutex<()>>,
    token: CancellationToken,
}

impl DeliveryGate {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(ReentrantMutex::new(())),
            token: CancellationToken::new(),
        }
    }

    /// Waits for an in-flight delivery on another thread to finish.
    pub fn close(&self) {
        let _held = self.lock.lock();
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the gate is closed.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }

    /// Run `deliver` unless the gate is closed.
    pub fn pass<R>(&self, deliver: impl FnOnce() -> R) -> Option<R> {
        let _held = self.lock.lock();
        if self.token.is_cancelled() {
            return None;
        }
        Some(deliver())
    }
}

impl Default for DeliveryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// One registered stream. The reader itself lives in the stream's task;
/// the registry keeps the gate that stops it.
#[derive(Debug)]
pub struct StreamEntry {
    pub id: StreamId,
    pub subject: String,
    pub started_at: Instant,
    pub gate: DeliveryGate,
}

/// Summary row returned by [`StreamRegistry::all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub id: StreamId,
    pub subject: String,
    /// Always `Active`: a stream leaves the registry when it ends.
    pub status: StreamStatus,
    pub duration_ms: u64,
}

#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: HashMap<StreamId, StreamEntry>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: StreamEntry) {
        self.streams.insert(entry.id.clone(), entry);
    }

    pub fn get(&self, id: &StreamId) -> Option<&StreamEntry> {
        self.streams.get(id)
    }

    pub fn remove(&mut self, id: &StreamId) -> Option<StreamEntry> {
        self.streams.remove(id)
    }

    /// Remove every entry (used for teardown).
    pub fn drain(&mut self) -> Vec<StreamEntry> {
        self.streams.drain().map(|(_, e)| e).collect()
    }

    /// Snapshot of the active streams, oldest first.
    pub fn all(&self) -> Vec<StreamInfo> {
        let now = Instant::now();
        let mut rows: Vec<(Instant, StreamInfo)> = self
            .streams
            .values()
            .map(|e| {
                let info = StreamInfo {
                    id: e.id.clone(),
                    subject: e.subject.clone(),
                    status: StreamStatus::Active,
                    duration_ms: now.saturating_duration_since(e.started_at).as_millis() as u64,
                };
                (e.started_at, info)
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        rows.into_iter().map(|(_, info)| info).collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
