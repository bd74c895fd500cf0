//! # Parley Server
//!
//! Small realtime chat backend.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parley
//!
//! # Run with a specific config file
//! parley --config /path/to/parley.toml
//!
//! # Run with environment overrides
//! PARLEY_PORT=8080 PARLEY_HOST=0.0.0.0 PARLEY_LIVE__WINDOW_MS=250 parley
//! ```

use anyhow::{bail, Result};
use parley_server::{handlers, metrics, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,parley_core=debug,parley_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}

fn load_config() -> Result<Config> {
    let mut args = std::env::args().skip(1);
    match (args.next().as_deref(), args.next()) {
        (None, _) => Config::load(),
        (Some("--config"), Some(path)) => Config::from_file(path),
        (Some(arg), _) => bail!("Unexpected argument: {arg} (usage: parley [--config <path>])"),
    }
}
