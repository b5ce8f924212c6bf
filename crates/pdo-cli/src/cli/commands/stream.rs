//! `pdo stream` – open a chunked stream and print what arrives.

use std::sync::Arc;

use anyhow::{bail, Result};
use pdo_core::config::PdoConfig;
use pdo_core::events::{Event, EventBus, EventKind};
use pdo_core::http::CurlTransport;
use pdo_core::stream::StreamManager;
use serde_json::json;

use super::endpoint;

pub async fn run_stream(
    cfg: &PdoConfig,
    symbol: &str,
    message: &str,
    base_url: Option<&str>,
) -> Result<()> {
    let transport = CurlTransport::new(endpoint(base_url, cfg)?);
    let manager = StreamManager::new(
        Arc::new(transport),
        EventBus::with_default_capacity(),
        cfg.retry_policy(),
    );
    let mut events = manager.bus().subscribe_to(&[
        EventKind::StreamMessage,
        EventKind::StreamError,
        EventKind::StreamComplete,
    ]);

    let stream_id = manager
        .connect(symbol, json!({ "message": message }), Arc::new(()))
        .await?;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                let closed = manager.close_all();
                tracing::info!(closed, "interrupted, streams closed");
                return Ok(());
            }
        };
        let Some(event) = event else { break };
        if event.stream_id() != Some(&stream_id) {
            continue;
        }
        match event {
            Event::StreamMessage { chunk, .. } => match chunk.content() {
                Some(text) => println!("{}", text),
                None => println!("{}", serde_json::to_string(&chunk)?),
            },
            Event::StreamError { error, .. } => bail!("stream {} failed: {}", stream_id, error),
            Event::StreamComplete { .. } => break,
            _ => {}
        }
    }
    Ok(())
}
