//! CLI for the PDO progressive data-delivery orchestrator.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pdo_core::config;
use pdo_core::network::NetworkTier;

use commands::{run_config, run_load, run_stream};

/// Top-level CLI for PDO.
#[derive(Debug, Parser)]
#[command(name = "pdo")]
#[command(about = "PDO: progressive data loading and chunked streams", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Load a symbol progressively and print events until the session completes.
    Load {
        /// Subject to load (e.g. a ticker symbol).
        symbol: String,
        /// Pin the network tier: fast, medium, slow, unknown (or 4g, 3g, 2g).
        #[arg(long, value_name = "TIER")]
        network: Option<NetworkTier>,
        /// Backend base URL; overrides `base_url` from config.
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
    },

    /// Open a chunked stream for a symbol and print chunks as they arrive.
    Stream {
        /// Subject of the stream.
        symbol: String,
        /// Message sent as the request payload.
        message: String,
        /// Backend base URL; overrides `base_url` from config.
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
    },

    /// Show the config file path and effective values.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Load {
                symbol,
                network,
                base_url,
            } => run_load(&cfg, &symbol, network, base_url.as_deref()).await?,
            CliCommand::Stream {
                symbol,
                message,
                base_url,
            } => run_stream(&cfg, &symbol, &message, base_url.as_deref()).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
