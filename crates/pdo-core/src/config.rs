use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::network::{DelayTable, NetworkTier};
use crate::retry::RetryPolicy;
use crate::session::SchedulerSettings;

/// Stream reconnect parameters (`[stream]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum connection attempts per stream (including the first).
    pub reconnect_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound on a single backoff delay.
    pub reconnect_max_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

/// Deferred-phase delays in milliseconds per network tier (`[phases]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseDelayConfig {
    pub fast: Vec<u64>,
    pub medium: Vec<u64>,
    pub slow: Vec<u64>,
}

impl Default for PhaseDelayConfig {
    fn default() -> Self {
        Self {
            fast: vec![100, 200, 300],
            medium: vec![200, 500, 1000],
            slow: vec![500, 1500, 3000],
        }
    }
}

/// Session bookkeeping intervals (`[session]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions older than this are dropped by the sweeper, finished or not.
    pub idle_sweep_ms: u64,
    /// How often the sweeper runs.
    pub sweep_interval_ms: u64,
    /// How often a session is checked for completion.
    pub completion_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_sweep_ms: 300_000,
            sweep_interval_ms: 60_000,
            completion_poll_ms: 100,
        }
    }
}

/// Global configuration loaded from `~/.config/pdo/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdoConfig {
    /// Pin the network tier instead of reading the runtime signal.
    #[serde(default)]
    pub network_tier: Option<NetworkTier>,
    /// Backend base URL used by the CLI (e.g. "http://127.0.0.1:8080/api/").
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub phases: PhaseDelayConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl PdoConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.stream.reconnect_attempts.max(1),
            base_delay: Duration::from_millis(self.stream.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.stream.reconnect_max_delay_ms),
        }
    }

    pub fn delay_table(&self) -> DelayTable {
        DelayTable::from(&self.phases)
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: Duration::from_millis(self.session.completion_poll_ms),
            idle_sweep: Duration::from_millis(self.session.idle_sweep_ms),
            sweep_interval: Duration::from_millis(self.session.sweep_interval_ms),
        }
        .normalized()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pdo")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PdoConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

/// Like [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<PdoConfig> {
    if !path.exists() {
        let default_cfg = PdoConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PdoConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
