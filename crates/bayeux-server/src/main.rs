//! # Bayeux Server
//!
//! Publish/subscribe messaging server speaking the Bayeux protocol over
//! HTTP long-polling, WebSocket and EventSource.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! bayeux
//!
//! # Run with a specific config file
//! BAYEUX_CONFIG=/path/to/bayeux.toml bayeux
//!
//! # Run with environment overrides
//! BAYEUX_PORT=8000 BAYEUX_HOST=0.0.0.0 BAYEUX_ENGINE__TIMEOUT_SECS=30 bayeux
//! ```

mod config;
mod eventsource;
mod handlers;
mod metrics;
mod observer;
mod websocket;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bayeux=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Bayeux server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
