//! CLI command handlers, one per file.

mod config;
mod load;
mod stream;

use anyhow::{anyhow, Result};
use pdo_core::config::PdoConfig;
use pdo_core::http::Endpoint;

pub use config::run_config;
pub use load::run_load;
pub use stream::run_stream;

/// `--base-url` if given, else `base_url` from config.
fn endpoint(flag: Option<&str>, cfg: &PdoConfig) -> Result<Endpoint> {
    let base = flag
        .or(cfg.base_url.as_deref())
        .ok_or_else(|| anyhow!("no backend URL: pass --base-url or set base_url in config.toml"))?;
    Ok(Endpoint::parse(base)?)
}
