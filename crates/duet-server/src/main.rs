//! # Duet Server
//!
//! Pairwise WebSocket relay server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (127.0.0.1:3000)
//! duet
//!
//! # Run with a specific config file
//! DUET_CONFIG=/path/to/duet.toml duet
//!
//! # Run with environment overrides
//! DUET_PORT=8080 DUET_HOST=0.0.0.0 duet
//! ```

use anyhow::Result;
use duet_server::{config::Config, handlers};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=debug,duet_server=debug,duet_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    tracing::info!("Starting Duet server on {}:{}", config.host, config.port);

    handlers::run_server(config).await?;

    Ok(())
}
