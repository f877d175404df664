//! LAN Relay Server
//!
//! Signaling relay for local peer-to-peer discovery.

use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lan_relay::{RelayServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = ServerConfig::from_env().context("Invalid configuration")?;

    info!("LAN Relay Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!(
        "Keepalive: {}s, idle timeout: {}s",
        config.keepalive_interval.as_secs(),
        config.idle_timeout.as_secs()
    );

    let server = Arc::new(RelayServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_server.shutdown();
        }
    });

    server.run().await?;

    info!("Server stopped");
    Ok(())
}
