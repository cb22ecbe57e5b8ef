//! ATEM Exporter
//!
//! Mirrors the live state of a Blackmagic ATEM switcher and exposes it as
//! Prometheus metrics.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod atem;
mod config;
mod metrics;
mod server;
mod state;

use crate::atem::lifecycle::{self, LifecycleConfig};
use crate::atem::{AtemTransport, UdpTransport};
use crate::config::Args;
use crate::server::AppState;
use crate::state::{ConnectionStatus, StateMirror};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();
    init_logging(&args.log_level)?;

    // Malformed configuration is the only fatal startup condition.
    let config = args.into_config()?;

    info!("Starting ATEM exporter...");
    info!("Switcher address: {}", config.atem_addr);

    let mirror = Arc::new(StateMirror::new());
    mirror.set_status(ConnectionStatus::Connecting);

    // Bring up the device connection in the background. An unreachable
    // switcher never blocks or kills startup.
    let transport: Arc<dyn AtemTransport> = Arc::new(UdpTransport::new(config.atem_addr));
    transport.start()?;
    let events = transport
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("Transport did not provide an event receiver"))?;

    tokio::spawn(lifecycle::run(
        Arc::clone(&mirror),
        Arc::clone(&transport),
        events,
        LifecycleConfig {
            refresh_interval: config.refresh_interval,
            clear_on_disconnect: config.clear_on_disconnect,
        },
    ));

    let app_state = Arc::new(AppState {
        mirror: Arc::clone(&mirror),
    });

    tokio::select! {
        result = server::start_server(app_state, config.port) => result?,
        _ = shutdown_signal() => {},
    }

    info!("ATEM exporter shutdown complete");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
