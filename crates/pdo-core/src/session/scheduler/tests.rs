//! Scheduler behaviour under a paused tokio clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;

use super::{PhaseScheduler, SchedulerSettings};
use crate::error::{FetchError, LoadError};
use crate::events::{Event, EventBus, EventKind, Subscription};
use crate::network::{DelayTable, NetworkEstimator, NetworkTier};
use crate::perf::MemoryRecorder;
use crate::session::{FnFetcher, PhaseFetcher, PhasePriority, PhaseStatus, PhaseTable};

fn counting(calls: &Arc<AtomicUsize>, ok: bool) -> Arc<dyn PhaseFetcher> {
    let calls = Arc::clone(calls);
    Arc::new(FnFetcher(move |subject: String| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if ok {
                Ok(json!({ "symbol": subject }))
            } else {
                Err(FetchError::failed("backend unavailable"))
            }
        }
    }))
}

fn stamping(stamps: &Arc<Mutex<Vec<Instant>>>) -> Arc<dyn PhaseFetcher> {
    let stamps = Arc::clone(stamps);
    Arc::new(FnFetcher(move |_subject: String| {
        stamps.lock().push(Instant::now());
        async { Ok(json!(null)) }
    }))
}

fn scheduler(table: PhaseTable, tier: NetworkTier) -> PhaseScheduler {
    PhaseScheduler::new(
        table,
        NetworkEstimator::fixed(Some(tier), DelayTable::default()),
        EventBus::with_default_capacity(),
        SchedulerSettings::default(),
    )
}

async fn until_complete(sub: &mut Subscription) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(60), sub.recv())
            .await
            .expect("session did not complete")
            .expect("bus closed");
        let done = event.kind() == EventKind::SessionComplete;
        events.push(event);
        if done {
            return events;
        }
    }
}

fn count(events: &[Event], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

#[tokio::test(start_paused = true)]
async fn deferred_failure_still_completes_session() {
    let quote = Arc::new(AtomicUsize::new(0));
    let chart = Arc::new(AtomicUsize::new(0));
    let table = PhaseTable::builder("quote", counting(&quote, true))
        .deferred("chart", PhasePriority::High, Duration::ZERO, counting(&chart, false))
        .build()
        .unwrap();
    let sched = scheduler(table, NetworkTier::Medium);
    let mut sub = sched.bus().subscribe();

    let id = sched.start_session("AAPL").await.unwrap();
    let events = until_complete(&mut sub).await;

    assert_eq!(count(&events, EventKind::SessionError), 0);
    assert_eq!(count(&events, EventKind::DataAvailable), 1);
    let chart_errors = events
        .iter()
        .filter(|e| {
            matches!(e, Event::PhaseStatusChanged { phase, status: PhaseStatus::Error, .. } if phase == "chart")
        })
        .count();
    assert_eq!(chart_errors, 1);
    assert!(matches!(events.last(), Some(Event::SessionComplete { session_id, .. }) if *session_id == id));
    assert!(sched.is_complete(&id));
    assert_eq!(chart.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn critical_failure_aborts_before_deferred_phases() {
    let quote = Arc::new(AtomicUsize::new(0));
    let others = Arc::new(AtomicUsize::new(0));
    let table = PhaseTable::builder("quote", counting(&quote, false))
        .deferred("chart", PhasePriority::High, Duration::ZERO, counting(&others, true))
        .deferred("news", PhasePriority::Low, Duration::ZERO, counting(&others, true))
        .build()
        .unwrap();
    let sched = scheduler(table, NetworkTier::Fast);
    let mut sub = sched.bus().subscribe();

    let err = sched.start_session("AAPL").await.unwrap_err();
    assert!(matches!(err, LoadError::CriticalPhase { ref phase, .. } if phase == "quote"));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(others.load(Ordering::SeqCst), 0);

    let events = sub.drain();
    assert_eq!(count(&events, EventKind::SessionError), 1);
    assert_eq!(count(&events, EventKind::DataAvailable), 0);
    assert_eq!(count(&events, EventKind::SessionComplete), 0);
}

#[tokio::test(start_paused = true)]
async fn one_deferred_failure_does_not_block_the_others() {
    let ok = Arc::new(AtomicUsize::new(0));
    let bad = Arc::new(AtomicUsize::new(0));
    let table = PhaseTable::reference(|name| {
        if name == "fundamentals" {
            counting(&bad, false)
        } else {
            counting(&ok, true)
        }
    });
    let sched = scheduler(table, NetworkTier::Slow);
    let mut sub = sched.bus().subscribe();

    let id = sched.start_session("MSFT").await.unwrap();
    let events = until_complete(&mut sub).await;

    assert_eq!(ok.load(Ordering::SeqCst), 3);
    assert_eq!(count(&events, EventKind::DataAvailable), 3);
    let session = sched.session(&id).unwrap();
    assert_eq!(session.status("chart"), Some(PhaseStatus::Completed));
    assert_eq!(session.status("fundamentals"), Some(PhaseStatus::Error));
    assert_eq!(session.status("news"), Some(PhaseStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn deferred_phases_wait_for_tier_delays() {
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let table = PhaseTable::builder("quote", stamping(&stamps))
        .deferred("chart", PhasePriority::High, Duration::ZERO, stamping(&stamps))
        .deferred("fundamentals", PhasePriority::Normal, Duration::ZERO, stamping(&stamps))
        .deferred("news", PhasePriority::Low, Duration::ZERO, stamping(&stamps))
        .deferred("filings", PhasePriority::Low, Duration::from_millis(4000), stamping(&stamps))
        .build()
        .unwrap();
    let sched = scheduler(table, NetworkTier::Fast);
    let mut sub = sched.bus().subscribe();

    let start = Instant::now();
    sched.start_session("NVDA").await.unwrap();
    until_complete(&mut sub).await;

    let offsets: Vec<u128> = stamps
        .lock()
        .iter()
        .map(|t| t.duration_since(start).as_millis())
        .collect();
    // critical at once, then the fast profile, then the nominal delay past its end
    let expected = [0u128, 100, 200, 300, 4000];
    assert_eq!(offsets.len(), expected.len());
    for (got, want) in offsets.iter().zip(expected) {
        assert!(*got >= want && *got <= want + 5, "offsets {:?}", offsets);
    }
}

#[tokio::test(start_paused = true)]
async fn paused_session_drops_deferred_outcomes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let table = PhaseTable::reference(|_| counting(&calls, true));
    let sched = scheduler(table, NetworkTier::Medium);
    let mut sub = sched.bus().subscribe();

    let id = sched.start_session("AAPL").await.unwrap();
    assert!(sched.pause_session(&id));
    tokio::time::sleep(Duration::from_secs(5)).await;

    // fetches still ran, results were discarded
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let session = sched.session(&id).unwrap();
    assert_eq!(session.status("quote"), Some(PhaseStatus::Completed));
    for phase in ["chart", "fundamentals", "news"] {
        assert_eq!(session.status(phase), Some(PhaseStatus::Pending));
    }
    let events = sub.drain();
    assert_eq!(count(&events, EventKind::DataAvailable), 1);
    assert_eq!(count(&events, EventKind::SessionComplete), 0);

    assert!(sched.resume_session(&id));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!sched.is_complete(&id));
    assert_eq!(sched.session(&id).unwrap().status("news"), Some(PhaseStatus::Pending));
}

#[tokio::test(start_paused = true)]
async fn sweeper_drops_stale_sessions() {
    let calls = Arc::new(AtomicUsize::new(0));
    let table = PhaseTable::reference(|_| counting(&calls, true));
    let sched = PhaseScheduler::new(
        table,
        NetworkEstimator::fixed(None, DelayTable::default()),
        EventBus::with_default_capacity(),
        SchedulerSettings {
            poll_interval: Duration::from_millis(100),
            idle_sweep: Duration::from_secs(2),
            sweep_interval: Duration::from_millis(500),
        },
    );
    let mut sub = sched.bus().subscribe_to(&[EventKind::SessionComplete]);

    let paused = sched.start_session("AAPL").await.unwrap();
    sched.pause_session(&paused);
    let finished = sched.start_session("MSFT").await.unwrap();

    let done = until_complete(&mut sub).await;
    assert_eq!(done[0].session_id(), Some(&finished));
    assert_eq!(sched.session_count(), 2);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sched.session_count(), 0);
    assert!(sched.session(&paused).is_none());
    assert!(!sched.resume_session(&paused));
    assert!(sub.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn default_scheduler_prunes_paused_session_and_its_monitor() {
    let calls = Arc::new(AtomicUsize::new(0));
    let recorder = Arc::new(MemoryRecorder::new());
    let sched = PhaseScheduler::with_recorder(
        PhaseTable::reference(|_| counting(&calls, true)),
        NetworkEstimator::fixed(Some(NetworkTier::Fast), DelayTable::default()),
        EventBus::with_default_capacity(),
        SchedulerSettings::default(),
        recorder.clone(),
    );

    let id = sched.start_session("AAPL").await.unwrap();
    assert!(sched.pause_session(&id));
    assert_eq!(recorder.session_count(), 1);

    tokio::time::sleep(Duration::from_secs(600)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(sched.session_count(), 0);
    assert_eq!(recorder.session_count(), 0);
    // Deferred tasks and the completion monitor have all exited; the
    // sweeper holds no strong reference.
    assert_eq!(Arc::strong_count(&sched.shared), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_tick_periods_are_raised() {
    let settings = SchedulerSettings {
        poll_interval: Duration::ZERO,
        idle_sweep: Duration::from_secs(1),
        sweep_interval: Duration::ZERO,
    };
    let calls = Arc::new(AtomicUsize::new(0));
    let sched = PhaseScheduler::new(
        PhaseTable::reference(|_| counting(&calls, true)),
        NetworkEstimator::fixed(Some(NetworkTier::Fast), DelayTable::default()),
        EventBus::with_default_capacity(),
        settings,
    );
    assert_eq!(sched.shared.settings.poll_interval, Duration::from_millis(1));
    assert_eq!(sched.shared.settings.sweep_interval, Duration::from_millis(1));

    let mut sub = sched.bus().subscribe_to(&[EventKind::SessionComplete]);
    let id = sched.start_session("AAPL").await.unwrap();
    let done = until_complete(&mut sub).await;
    assert_eq!(done[0].session_id(), Some(&id));
}

#[tokio::test(start_paused = true)]
async fn failed_critical_phase_is_recorded_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let recorder = Arc::new(MemoryRecorder::new());
    let table = PhaseTable::builder("quote", counting(&calls, false))
        .deferred("chart", PhasePriority::High, Duration::ZERO, counting(&calls, true))
        .build()
        .unwrap();
    let sched = PhaseScheduler::with_recorder(
        table,
        NetworkEstimator::fixed(Some(NetworkTier::Fast), DelayTable::default()),
        EventBus::with_default_capacity(),
        SchedulerSettings::default(),
        recorder.clone(),
    );

    let err = sched.start_session("AAPL").await.unwrap_err();
    let LoadError::CriticalPhase { session_id, .. } = err else {
        panic!("expected critical failure");
    };
    let timings = recorder.timings(&session_id).unwrap();
    assert_eq!(timings.phases.len(), 1);
    assert_eq!(timings.phases[0].0, "quote");
    assert!(timings.total.is_none());
}

#[tokio::test(start_paused = true)]
async fn recorder_receives_phase_and_session_timings() {
    let calls = Arc::new(AtomicUsize::new(0));
    let recorder = Arc::new(MemoryRecorder::new());
    let sched = PhaseScheduler::with_recorder(
        PhaseTable::reference(|_| counting(&calls, true)),
        NetworkEstimator::fixed(Some(NetworkTier::Fast), DelayTable::default()),
        EventBus::with_default_capacity(),
        SchedulerSettings::default(),
        recorder.clone(),
    );
    let mut sub = sched.bus().subscribe();

    let id = sched.start_session("AMZN").await.unwrap();
    let events = until_complete(&mut sub).await;

    let timings = recorder.timings(&id).unwrap();
    assert_eq!(timings.phases.len(), 4);
    assert_eq!(timings.phases[0].0, "quote");
    let Some(Event::SessionComplete { elapsed_ms, .. }) = events.last() else {
        panic!("expected session-complete last");
    };
    assert_eq!(timings.total.map(|t| t.as_millis() as u64), Some(*elapsed_ms));
    assert!(*elapsed_ms >= 300);
}
