use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracker_aggregator::{Aggregator, Config, EventProcessor, EventStore};
use tracker_pipeline::{resolve_host, BrokerClient, EventConsumer};
use tracker_watcher::{EventSink, FsMonitor};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    let host = resolve_host().context("Cannot resolve host identity")?;

    info!(
        service = %config.service.name,
        host_id = %host.id,
        hostname = %host.hostname,
        "Starting tracker aggregator"
    );

    let store = Arc::new(
        EventStore::connect(&config.database)
            .await
            .context("Failed to open event store")?,
    );

    // The consuming machine is a host too; record it so its id resolves in
    // the analytics views even before it produces events.
    store.upsert_host(&host).await?;

    let client = Arc::new(BrokerClient::new(config.kafka.clone()));

    // Bounded connect attempts with a fixed delay. Without a broker there is
    // nothing to consume, so exhausting them leaves the service idle with the
    // store still open for queries.
    let attempts = config.kafka.reliability.startup_attempts;
    let mut connected = false;
    for attempt in 1..=attempts {
        if client.check_connection().await {
            connected = true;
            break;
        }
        if attempt < attempts {
            warn!(attempt, "Broker not reachable, retrying");
            tokio::time::sleep(config.kafka.startup_delay()).await;
        }
    }

    let aggregator = Arc::new(Aggregator::new(store.clone()));

    let processor = if connected {
        let consumer = Arc::new(EventConsumer::new(client.clone()));
        let processor = Arc::new(EventProcessor::new(consumer, aggregator.clone()));
        processor
            .start()
            .await
            .context("Failed to start event processor")?;
        Some(processor)
    } else {
        error!("Broker unreachable after {attempts} attempts, consumer not started");
        None
    };

    // Co-located mode: watch directories in this process and apply events
    // directly, without a broker round trip.
    let monitor = if config.watch.enabled {
        aggregator.set_processing(true);
        let monitor = FsMonitor::new(
            host,
            config.watch.settings.clone(),
            EventSink::Handler(aggregator.clone()),
        );
        monitor
            .start()
            .await
            .context("Failed to start local file monitor")?;
        info!("Local watch enabled, events bypass the broker");
        Some(monitor)
    } else {
        None
    };

    shutdown_signal().await;

    info!("Shutting down tracker aggregator");
    if let Some(monitor) = monitor {
        monitor.stop().await;
    }
    if let Some(processor) = processor {
        processor.stop().await;
    }
    client.disconnect().await;

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
