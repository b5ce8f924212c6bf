//! One deferred phase: wait, fetch, record. Failures stay local to the phase.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::events::Event;
use crate::ids::SessionId;
use crate::session::registry::PhaseStatus;

use super::Shared;

/// `index` is the position among deferred phases.
pub(super) async fn run_deferred(
    shared: Arc<Shared>,
    session_id: SessionId,
    subject: String,
    index: usize,
    delay: Duration,
) {
    tokio::time::sleep(delay).await;

    let Some(phase) = shared.phases.deferred().get(index) else {
        return;
    };
    if shared.registry.lock().get(&session_id).is_none() {
        tracing::debug!(session_id = %session_id, phase = %phase.name, "session gone, skipping phase");
        return;
    }

    let phase_start = Instant::now();
    shared.transition(&session_id, &phase.name, PhaseStatus::Loading);

    match phase.fetcher.fetch(&subject).await {
        Ok(payload) => {
            if shared.transition(&session_id, &phase.name, PhaseStatus::Completed) {
                shared.bus.publish(Event::DataAvailable {
                    session_id: session_id.clone(),
                    phase: phase.name.clone(),
                    payload,
                });
                shared
                    .recorder
                    .record_phase(&session_id, &phase.name, phase_start.elapsed());
            }
        }
        Err(e) => {
            tracing::warn!(
                session_id = %session_id,
                phase = %phase.name,
                "deferred phase failed: {}",
                e
            );
            if shared.transition(&session_id, &phase.name, PhaseStatus::Error) {
                shared
                    .recorder
                    .record_phase(&session_id, &phase.name, phase_start.elapsed());
            }
        }
    }
}
