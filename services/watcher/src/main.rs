use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracker_pipeline::{resolve_host, BrokerClient, EventPublisher};
use tracker_watcher::{Config, EventSink, FsMonitor};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    // No stable host identity means no partition key; fatal, not retried.
    let host = resolve_host().context("Cannot resolve host identity")?;

    info!(
        service = %config.service.name,
        host_id = %host.id,
        hostname = %host.hostname,
        "Starting tracker watcher"
    );

    let client = Arc::new(BrokerClient::new(config.kafka.clone()));
    let publisher = Arc::new(EventPublisher::new(client));

    // Bounded connect attempts with a fixed delay; after exhausting them the
    // watcher keeps running and every publish fails loudly instead.
    let attempts = config.kafka.reliability.startup_attempts;
    for attempt in 1..=attempts {
        match publisher.initialize().await {
            Ok(()) => break,
            Err(e) if attempt < attempts => {
                warn!(attempt, error = %e, "Broker not reachable, retrying");
                tokio::time::sleep(config.kafka.startup_delay()).await;
            }
            Err(e) => {
                error!(error = %e, "Broker unreachable after {attempts} attempts, running degraded");
            }
        }
    }

    let monitor = FsMonitor::new(
        host,
        config.watch.clone(),
        EventSink::Publisher(publisher),
    );
    monitor.start().await.context("Failed to start file watcher")?;

    shutdown_signal().await;

    info!("Shutting down tracker watcher");
    monitor.stop().await;

    Ok(())
}

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}
