//! Drives loading sessions through their phases.
//!
//! `start_session` awaits the critical phase, then spawns one task per
//! deferred phase (delayed per the network estimate) and a completion
//! monitor. Outcomes are published on the [`EventBus`]. The first session
//! also starts an idle sweeper that lives as long as the scheduler.

mod deferred;
mod monitor;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::LoadError;
use crate::events::{Event, EventBus};
use crate::ids::SessionId;
use crate::network::NetworkEstimator;
use crate::perf::{NoopRecorder, PerformanceRecorder};

use super::phases::PhaseTable;
use super::registry::{LoadingSession, PhaseStatus, SessionRegistry};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Timing knobs for the scheduler's background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Completion check interval.
    pub poll_interval: Duration,
    /// Age after which the sweeper drops a session.
    pub idle_sweep: Duration,
    /// Sweeper period.
    pub sweep_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            idle_sweep: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl SchedulerSettings {
    /// Raise zero tick periods to 1ms; tokio intervals reject zero.
    pub fn normalized(self) -> Self {
        Self {
            poll_interval: self.poll_interval.max(MIN_INTERVAL),
            sweep_interval: self.sweep_interval.max(MIN_INTERVAL),
            ..self
        }
    }
}

pub(super) struct Shared {
    pub(super) registry: Mutex<SessionRegistry>,
    pub(super) phases: PhaseTable,
    pub(super) bus: EventBus,
    pub(super) recorder: Arc<dyn PerformanceRecorder>,
    pub(super) settings: SchedulerSettings,
    /// Idle sweeper, started with the first session.
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}

impl Shared {
    /// Apply a transition and announce it. Dropped transitions (paused or
    /// unknown session) publish nothing and return false.
    pub(super) fn transition(&self, session_id: &SessionId, phase: &str, status: PhaseStatus) -> bool {
        let applied = self.registry.lock().set_phase(session_id, phase, status);
        if applied {
            self.bus.publish(Event::PhaseStatusChanged {
                session_id: session_id.clone(),
                phase: phase.to_owned(),
                status,
            });
        } else {
            tracing::debug!(session_id = %session_id, phase, ?status, "transition dropped");
        }
        applied
    }
}

/// Cloneable handle; clones share sessions, phases and the bus.
#[derive(Clone)]
pub struct PhaseScheduler {
    shared: Arc<Shared>,
    estimator: NetworkEstimator,
}

impl PhaseScheduler {
    pub fn new(
        phases: PhaseTable,
        estimator: NetworkEstimator,
        bus: EventBus,
        settings: SchedulerSettings,
    ) -> Self {
        Self::with_recorder(phases, estimator, bus, settings, Arc::new(NoopRecorder))
    }

    /// Like [`PhaseScheduler::new`], reporting timings to `recorder`.
    pub fn with_recorder(
        phases: PhaseTable,
        estimator: NetworkEstimator,
        bus: EventBus,
        settings: SchedulerSettings,
        recorder: Arc<dyn PerformanceRecorder>,
    ) -> Self {
        let registry = SessionRegistry::new(phases.names());
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(registry),
                phases,
                bus,
                recorder,
                settings: settings.normalized(),
                sweeper: Mutex::new(None),
            }),
            estimator,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Start loading `subject`. Returns once the critical phase has completed;
    /// a critical failure aborts the session and no deferred phase is started.
    pub async fn start_session(&self, subject: &str) -> Result<SessionId, LoadError> {
        let started = Instant::now();
        self.ensure_sweeper();
        let session_id = self.shared.registry.lock().create(subject);
        self.shared.recorder.start_session(&session_id);
        tracing::info!(session_id = %session_id, subject, "session started");

        let profile = self.estimator.estimate();

        self.run_critical(&session_id, subject).await?;

        for (index, phase) in self.shared.phases.deferred().iter().enumerate() {
            let delay = profile.delay_for(index).unwrap_or(phase.nominal_delay);
            tracing::debug!(
                session_id = %session_id,
                phase = %phase.name,
                delay_ms = delay.as_millis() as u64,
                "deferred phase scheduled"
            );
            tokio::spawn(deferred::run_deferred(
                Arc::clone(&self.shared),
                session_id.clone(),
                subject.to_owned(),
                index,
                delay,
            ));
        }

        tokio::spawn(monitor::watch_completion(
            Arc::clone(&self.shared),
            session_id.clone(),
            started,
        ));

        Ok(session_id)
    }

    async fn run_critical(&self, session_id: &SessionId, subject: &str) -> Result<(), LoadError> {
        let shared = &self.shared;
        let phase = shared.phases.critical();
        let phase_start = Instant::now();
        shared.transition(session_id, &phase.name, PhaseStatus::Loading);

        match phase.fetcher.fetch(subject).await {
            Ok(payload) => {
                if shared.transition(session_id, &phase.name, PhaseStatus::Completed) {
                    shared.bus.publish(Event::DataAvailable {
                        session_id: session_id.clone(),
                        phase: phase.name.clone(),
                        payload,
                    });
                    shared
                        .recorder
                        .record_phase(session_id, &phase.name, phase_start.elapsed());
                }
                Ok(())
            }
            Err(source) => {
                if shared.transition(session_id, &phase.name, PhaseStatus::Error) {
                    shared
                        .recorder
                        .record_phase(session_id, &phase.name, phase_start.elapsed());
                }
                tracing::warn!(
                    session_id = %session_id,
                    phase = %phase.name,
                    "critical phase failed: {}",
                    source
                );
                shared.bus.publish(Event::SessionError {
                    session_id: session_id.clone(),
                    error: source.to_string(),
                });
                Err(LoadError::CriticalPhase {
                    session_id: session_id.clone(),
                    phase: phase.name.clone(),
                    source,
                })
            }
        }
    }

    /// Suppress phase transitions for the session. Already scheduled phases still
    /// run; their outcomes are discarded. Returns false for unknown sessions.
    pub fn pause_session(&self, session_id: &SessionId) -> bool {
        let paused = self.shared.registry.lock().pause(session_id);
        if paused {
            tracing::info!(session_id = %session_id, "session paused");
        }
        paused
    }

    /// Re-enable transitions. Outcomes dropped while paused are not replayed.
    pub fn resume_session(&self, session_id: &SessionId) -> bool {
        let resumed = self.shared.registry.lock().resume(session_id);
        if resumed {
            tracing::info!(session_id = %session_id, "session resumed");
        }
        resumed
    }

    pub fn is_complete(&self, session_id: &SessionId) -> bool {
        self.shared.registry.lock().is_complete(session_id)
    }

    /// Copy of the session's current state.
    pub fn session(&self, session_id: &SessionId) -> Option<LoadingSession> {
        self.shared.registry.lock().get(session_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// One sweep pass with the configured idle cutoff. Returns how many sessions were dropped.
    /// The scheduler also sweeps on its own every `sweep_interval` once a session has started.
    pub fn sweep_idle(&self) -> usize {
        monitor::sweep_once(&self.shared)
    }

    fn ensure_sweeper(&self) {
        let mut slot = self.shared.sweeper.lock();
        if slot.is_none() {
            *slot = Some(tokio::spawn(monitor::run_sweeper(
                Arc::downgrade(&self.shared),
                self.shared.settings.sweep_interval,
            )));
        }
    }
}

#[cfg(test)]
mod tests;
