//! Session performance sink.
//!
//! The scheduler reports session start, each finished phase and total
//! session time here. Rendering or shipping those numbers is up to the
//! implementation.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::ids::SessionId;

pub trait PerformanceRecorder: Send + Sync {
    fn start_session(&self, session_id: &SessionId);
    fn record_phase(&self, session_id: &SessionId, phase: &str, elapsed: Duration);
    fn complete_session(&self, session_id: &SessionId, total: Duration);
    /// The session left the scheduler (idle sweep). Drop anything kept for it.
    fn forget_session(&self, _session_id: &SessionId) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl PerformanceRecorder for NoopRecorder {
    fn start_session(&self, _session_id: &SessionId) {}
    fn record_phase(&self, _session_id: &SessionId, _phase: &str, _elapsed: Duration) {}
    fn complete_session(&self, _session_id: &SessionId, _total: Duration) {}
}

/// Emits timings as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl PerformanceRecorder for TracingRecorder {
    fn start_session(&self, session_id: &SessionId) {
        tracing::debug!(session_id = %session_id, "perf: session started");
    }

    fn record_phase(&self, session_id: &SessionId, phase: &str, elapsed: Duration) {
        tracing::info!(
            session_id = %session_id,
            phase,
            elapsed_ms = elapsed.as_millis() as u64,
            "perf: phase finished"
        );
    }

    fn complete_session(&self, session_id: &SessionId, total: Duration) {
        tracing::info!(
            session_id = %session_id,
            total_ms = total.as_millis() as u64,
            "perf: session complete"
        );
    }
}

/// Timings collected for one session by [`MemoryRecorder`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTimings {
    /// (phase, elapsed) in the order phases finished.
    pub phases: Vec<(String, Duration)>,
    pub total: Option<Duration>,
}

/// Keeps timings in memory, keyed by session.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    sessions: Mutex<HashMap<SessionId, SessionTimings>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timings(&self, session_id: &SessionId) -> Option<SessionTimings> {
        self.sessions.lock().get(session_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl PerformanceRecorder for MemoryRecorder {
    fn start_session(&self, session_id: &SessionId) {
        self.sessions
            .lock()
            .insert(session_id.clone(), SessionTimings::default());
    }

    fn record_phase(&self, session_id: &SessionId, phase: &str, elapsed: Duration) {
        if let Some(t) = self.sessions.lock().get_mut(session_id) {
            t.phases.push((phase.to_owned(), elapsed));
        }
    }

    fn complete_session(&self, session_id: &SessionId, total: Duration) {
        if let Some(t) = self.sessions.lock().get_mut(session_id) {
            t.total = Some(total);
        }
    }

    fn forget_session(&self, session_id: &SessionId) {
        self.sessions.lock().remove(session_id);
    }
}
