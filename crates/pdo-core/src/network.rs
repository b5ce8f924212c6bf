//! Network condition estimate: connectivity tier -> deferred-phase delays.
//!
//! The tier is read once per `estimate()` call from a [`ConnectivitySignal`];
//! nothing is polled in the background.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PhaseDelayConfig;

/// Environment variable read by [`EnvSignal`].
pub const NETWORK_TIER_ENV: &str = "PDO_NETWORK_TIER";

/// Coarse network quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkTier {
    Fast,
    Medium,
    Slow,
    Unknown,
}

impl FromStr for NetworkTier {
    type Err = String;

    /// Accepts tier names and effective connection types (`4g`, `3g`, `2g`, `slow-2g`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "4g" | "5g" | "wifi" | "ethernet" => Ok(NetworkTier::Fast),
            "medium" | "3g" => Ok(NetworkTier::Medium),
            "slow" | "2g" | "slow-2g" => Ok(NetworkTier::Slow),
            "unknown" | "" => Ok(NetworkTier::Unknown),
            other => Err(format!("unrecognized network tier '{}'", other)),
        }
    }
}

impl fmt::Display for NetworkTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkTier::Fast => "fast",
            NetworkTier::Medium => "medium",
            NetworkTier::Slow => "slow",
            NetworkTier::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Source of the current connectivity reading.
pub trait ConnectivitySignal: Send + Sync {
    /// Current tier, or `None` when no signal is available.
    fn tier(&self) -> Option<NetworkTier>;
}

/// Fixed reading (or none).
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSignal(pub Option<NetworkTier>);

impl ConnectivitySignal for StaticSignal {
    fn tier(&self) -> Option<NetworkTier> {
        self.0
    }
}

/// Reads `PDO_NETWORK_TIER` on every call; unset or unparsable means no signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSignal;

impl ConnectivitySignal for EnvSignal {
    fn tier(&self) -> Option<NetworkTier> {
        let raw = std::env::var(NETWORK_TIER_ENV).ok()?;
        match raw.parse() {
            Ok(tier) => Some(tier),
            Err(e) => {
                tracing::debug!("ignoring {}: {}", NETWORK_TIER_ENV, e);
                None
            }
        }
    }
}

/// Delays for the deferred phases under one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayProfile {
    pub tier: NetworkTier,
    delays: Vec<Duration>,
}

impl DelayProfile {
    pub fn new(tier: NetworkTier, delays: Vec<Duration>) -> Self {
        Self { tier, delays }
    }

    /// Delay before deferred phase `index` (0 = first phase after the critical one).
    /// `None` past the end of the profile; callers fall back to the phase's nominal delay.
    pub fn delay_for(&self, index: usize) -> Option<Duration> {
        self.delays.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }
}

/// Delay lists per known tier; `Unknown` uses `medium`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayTable {
    pub fast: Vec<Duration>,
    pub medium: Vec<Duration>,
    pub slow: Vec<Duration>,
}

impl DelayTable {
    pub fn profile_for(&self, tier: NetworkTier) -> DelayProfile {
        let delays = match tier {
            NetworkTier::Fast => &self.fast,
            NetworkTier::Slow => &self.slow,
            NetworkTier::Medium | NetworkTier::Unknown => &self.medium,
        };
        DelayProfile::new(tier, delays.clone())
    }
}

impl From<&PhaseDelayConfig> for DelayTable {
    fn from(cfg: &PhaseDelayConfig) -> Self {
        let ms = |v: &[u64]| v.iter().map(|&m| Duration::from_millis(m)).collect();
        Self {
            fast: ms(&cfg.fast),
            medium: ms(&cfg.medium),
            slow: ms(&cfg.slow),
        }
    }
}

impl Default for DelayTable {
    fn default() -> Self {
        Self::from(&PhaseDelayConfig::default())
    }
}

/// Classifies the current signal into a [`DelayProfile`].
#[derive(Clone)]
pub struct NetworkEstimator {
    signal: Arc<dyn ConnectivitySignal>,
    table: DelayTable,
}

impl NetworkEstimator {
    pub fn new(signal: Arc<dyn ConnectivitySignal>, table: DelayTable) -> Self {
        Self { signal, table }
    }

    /// Estimator pinned to one tier (or none); handy for CLI overrides and tests.
    pub fn fixed(tier: Option<NetworkTier>, table: DelayTable) -> Self {
        Self::new(Arc::new(StaticSignal(tier)), table)
    }

    pub fn estimate(&self) -> DelayProfile {
        let tier = self.signal.tier().unwrap_or(NetworkTier::Unknown);
        let profile = self.table.profile_for(tier);
        tracing::debug!(tier = %tier, delays = ?profile.delays, "network estimate");
        profile
    }
}

impl fmt::Debug for NetworkEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkEstimator")
            .field("tier", &self.signal.tier())
            .field("table", &self.table)
            .finish()
    }
}

impl Default for NetworkEstimator {
    fn default() -> Self {
        Self::new(Arc::new(EnvSignal), DelayTable::default())
    }
}
