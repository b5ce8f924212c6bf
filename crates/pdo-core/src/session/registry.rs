//! Per-session phase status, pause flag and timestamps.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::ids::SessionId;

/// Status of one phase within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Loading,
    Completed,
    Error,
}

impl PhaseStatus {
    /// Completed and error both end a phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Error)
    }
}

/// One progressive load for a single subject.
#[derive(Debug, Clone)]
pub struct LoadingSession {
    pub id: SessionId,
    pub subject: String,
    /// Phase statuses in declared order.
    pub phases: Vec<(String, PhaseStatus)>,
    pub paused: bool,
    pub started_at: Instant,
    pub last_updated_at: Instant,
}

impl LoadingSession {
    pub fn status(&self, phase: &str) -> Option<PhaseStatus> {
        self.phases
            .iter()
            .find(|(name, _)| name == phase)
            .map(|(_, s)| *s)
    }

    pub fn is_complete(&self) -> bool {
        self.phases.iter().all(|(_, s)| s.is_terminal())
    }
}

/// Owns every live session. Not thread-safe by itself; the scheduler wraps it in a lock.
#[derive(Debug)]
pub struct SessionRegistry {
    phase_names: Vec<String>,
    sessions: HashMap<SessionId, LoadingSession>,
}

impl SessionRegistry {
    /// Registry whose sessions track `phase_names`, in that order.
    pub fn new(phase_names: Vec<String>) -> Self {
        Self {
            phase_names,
            sessions: HashMap::new(),
        }
    }

    /// Allocate a session with every phase pending and not paused.
    pub fn create(&mut self, subject: &str) -> SessionId {
        let id = SessionId::generate(subject);
        let now = Instant::now();
        let session = LoadingSession {
            id: id.clone(),
            subject: subject.to_owned(),
            phases: self
                .phase_names
                .iter()
                .map(|name| (name.clone(), PhaseStatus::Pending))
                .collect(),
            paused: false,
            started_at: now,
            last_updated_at: now,
        };
        self.sessions.insert(id.clone(), session);
        id
    }

    /// Transition `phase`. Returns false (and changes nothing) when the session
    /// is unknown, paused, or has no such phase.
    pub fn set_phase(&mut self, id: &SessionId, phase: &str, status: PhaseStatus) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        if session.paused {
            return false;
        }
        let Some(slot) = session.phases.iter_mut().find(|(name, _)| name == phase) else {
            return false;
        };
        slot.1 = status;
        session.last_updated_at = Instant::now();
        true
    }

    /// True iff every phase is completed or error; false for unknown sessions.
    pub fn is_complete(&self, id: &SessionId) -> bool {
        self.sessions.get(id).is_some_and(LoadingSession::is_complete)
    }

    /// Returns false if the session is unknown.
    pub fn pause(&mut self, id: &SessionId) -> bool {
        self.set_paused(id, true)
    }

    /// Returns false if the session is unknown.
    pub fn resume(&mut self, id: &SessionId) -> bool {
        self.set_paused(id, false)
    }

    fn set_paused(&mut self, id: &SessionId, paused: bool) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.paused = paused;
                true
            }
            None => false,
        }
    }

    /// Drop sessions started more than `max_idle` ago, finished or not.
    /// Returns the removed ids.
    pub fn sweep(&mut self, max_idle: Duration) -> Vec<SessionId> {
        let now = Instant::now();
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.started_at) > max_idle)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
        }
        expired
    }

    pub fn get(&self, id: &SessionId) -> Option<&LoadingSession> {
        self.sessions.get(id)
    }

    pub fn phase_names(&self) -> &[String] {
        &self.phase_names
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
