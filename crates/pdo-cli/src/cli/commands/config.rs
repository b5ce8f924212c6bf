//! `pdo config` – show config path and effective values.

use anyhow::Result;
use pdo_core::config::{self, PdoConfig};

pub fn run_config(cfg: &PdoConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
