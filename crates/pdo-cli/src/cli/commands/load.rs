//! `pdo load` – run one progressive session over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use pdo_core::config::PdoConfig;
use pdo_core::events::{Event, EventBus};
use pdo_core::http::CurlFetcher;
use pdo_core::network::{EnvSignal, NetworkEstimator, NetworkTier};
use pdo_core::perf::MemoryRecorder;
use pdo_core::session::{PhaseFetcher, PhaseScheduler, PhaseTable};

use super::endpoint;

pub async fn run_load(
    cfg: &PdoConfig,
    symbol: &str,
    network: Option<NetworkTier>,
    base_url: Option<&str>,
) -> Result<()> {
    let endpoint = endpoint(base_url, cfg)?;
    let table = PhaseTable::reference(|phase| {
        Arc::new(CurlFetcher::new(endpoint.clone(), phase)) as Arc<dyn PhaseFetcher>
    });
    let estimator = match network.or(cfg.network_tier) {
        Some(tier) => NetworkEstimator::fixed(Some(tier), cfg.delay_table()),
        None => NetworkEstimator::new(Arc::new(EnvSignal), cfg.delay_table()),
    };
    let recorder = Arc::new(MemoryRecorder::new());
    let scheduler = PhaseScheduler::with_recorder(
        table,
        estimator,
        EventBus::with_default_capacity(),
        cfg.scheduler_settings(),
        recorder.clone(),
    );

    let mut events = scheduler.bus().subscribe();
    let session_id = scheduler
        .start_session(symbol)
        .await
        .with_context(|| format!("load {}", symbol))?;

    while let Some(event) = events.recv().await {
        if event.session_id() != Some(&session_id) {
            continue;
        }
        println!("{}", serde_json::to_string(&event)?);
        if matches!(event, Event::SessionComplete { .. }) {
            break;
        }
    }

    if let Some(timings) = recorder.timings(&session_id) {
        for (phase, elapsed) in &timings.phases {
            println!("{:<14} {:>8} ms", phase, elapsed.as_millis());
        }
        if let Some(total) = timings.total {
            println!("{:<14} {:>8} ms", "total", total.as_millis());
        }
    }
    Ok(())
}
