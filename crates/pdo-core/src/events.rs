//! Typed publish/subscribe surface between the core and its consumers.
//!
//! Every session and stream outcome is published as an [`Event`] on a
//! `tokio::sync::broadcast` channel. Consumers either take the full feed
//! with [`EventBus::subscribe`] or a topic-filtered feed with
//! [`EventBus::subscribe_to`].

use serde::Serialize;
use tokio::sync::broadcast;

use crate::ids::{SessionId, StreamId};
use crate::session::PhaseStatus;
use crate::stream::StreamChunk;
use crate::Payload;

/// Default number of buffered events per subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Everything the loader and the stream manager report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    PhaseStatusChanged {
        session_id: SessionId,
        phase: String,
        status: PhaseStatus,
    },
    DataAvailable {
        session_id: SessionId,
        phase: String,
        payload: Payload,
    },
    SessionError {
        session_id: SessionId,
        error: String,
    },
    SessionComplete {
        session_id: SessionId,
        elapsed_ms: u64,
    },
    StreamMessage {
        stream_id: StreamId,
        chunk: StreamChunk,
    },
    StreamError {
        stream_id: StreamId,
        error: String,
    },
    StreamComplete {
        stream_id: StreamId,
    },
}

/// Topic of an [`Event`], one per event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PhaseStatusChanged,
    DataAvailable,
    SessionError,
    SessionComplete,
    StreamMessage,
    StreamError,
    StreamComplete,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PhaseStatusChanged => "phase-status-changed",
            EventKind::DataAvailable => "data-available",
            EventKind::SessionError => "session-error",
            EventKind::SessionComplete => "session-complete",
            EventKind::StreamMessage => "stream-message",
            EventKind::StreamError => "stream-error",
            EventKind::StreamComplete => "stream-complete",
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::PhaseStatusChanged { .. } => EventKind::PhaseStatusChanged,
            Event::DataAvailable { .. } => EventKind::DataAvailable,
            Event::SessionError { .. } => EventKind::SessionError,
            Event::SessionComplete { .. } => EventKind::SessionComplete,
            Event::StreamMessage { .. } => EventKind::StreamMessage,
            Event::StreamError { .. } => EventKind::StreamError,
            Event::StreamComplete { .. } => EventKind::StreamComplete,
        }
    }

    /// Session this event belongs to, if it is a loader event.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Event::PhaseStatusChanged { session_id, .. }
            | Event::DataAvailable { session_id, .. }
            | Event::SessionError { session_id, .. }
            | Event::SessionComplete { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    /// Stream this event belongs to, if it is a stream event.
    pub fn stream_id(&self) -> Option<&StreamId> {
        match self {
            Event::StreamMessage { stream_id, .. }
            | Event::StreamError { stream_id, .. }
            | Event::StreamComplete { stream_id } => Some(stream_id),
            _ => None,
        }
    }
}

/// Cloneable handle to the shared broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Publish to all current subscribers. Events with no subscriber are dropped.
    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            tracing::trace!(event = kind.as_str(), "no subscribers");
        }
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            kinds: None,
        }
    }

    /// Subscribe to the given topics only.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            kinds: Some(kinds.to_vec()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiving side of the bus, optionally filtered by topic.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
    kinds: Option<Vec<EventKind>>,
}

impl Subscription {
    fn wants(&self, event: &Event) -> bool {
        self.kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&event.kind()))
    }

    /// Next matching event; `None` once the bus is gone.
    /// A lagging subscriber skips the overwritten events and keeps going.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain every matching event already buffered.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
