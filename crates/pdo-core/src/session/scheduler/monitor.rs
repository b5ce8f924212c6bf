//! Background bookkeeping: completion polling and the idle sweeper.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::events::Event;
use crate::ids::SessionId;

use super::Shared;

/// Poll until every phase is terminal, then publish `SessionComplete`.
/// Stops silently if the session is swept first.
pub(super) async fn watch_completion(shared: Arc<Shared>, session_id: SessionId, started: Instant) {
    let mut ticker = tokio::time::interval(shared.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let complete = shared
            .registry
            .lock()
            .get(&session_id)
            .map(|s| s.is_complete());
        match complete {
            Some(true) => break,
            Some(false) => continue,
            None => {
                tracing::debug!(session_id = %session_id, "session removed before completion");
                return;
            }
        }
    }

    let elapsed = started.elapsed();
    shared.recorder.complete_session(&session_id, elapsed);
    tracing::info!(
        session_id = %session_id,
        elapsed_ms = elapsed.as_millis() as u64,
        "session complete"
    );
    shared.bus.publish(Event::SessionComplete {
        session_id,
        elapsed_ms: elapsed.as_millis() as u64,
    });
}

pub(super) fn sweep_once(shared: &Shared) -> usize {
    let removed = shared.registry.lock().sweep(shared.settings.idle_sweep);
    for session_id in &removed {
        shared.recorder.forget_session(session_id);
    }
    if !removed.is_empty() {
        tracing::debug!(count = removed.len(), "swept idle sessions");
    }
    removed.len()
}

/// Sweeps every `period` until the scheduler is dropped.
pub(super) async fn run_sweeper(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        sweep_once(&shared);
    }
}
