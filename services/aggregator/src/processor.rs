//! Event application and consumer lifecycle.
//!
//! [`Aggregator`] is the handler the consume loop drives: it appends each
//! event to the raw log and then bumps the three rollups. [`EventProcessor`]
//! wraps it with a start/stop lifecycle around the shared
//! [`EventConsumer`](tracker_pipeline::EventConsumer).
//!
//! Failure handling is deliberately asymmetric. A failed raw insert is the
//! handler's error: the event is dropped and the loop moves on. A failed
//! rollup after a successful insert is only logged; the raw log already has
//! the event, and re-running the rollup would double-count.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracker_pipeline::{async_trait, EventConsumer, EventHandler, FileEvent};

use crate::store::{day_of, hour_of, EventStore};

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Processor is already running")]
    AlreadyRunning,

    #[error("Broker is unavailable: {0}")]
    Unavailable(String),
}

/// Applies one event to the store: raw log first, then the rollups.
pub struct Aggregator {
    store: Arc<EventStore>,
    /// Gate checked on every event. When closed, events are dropped without
    /// touching the store, so a stopping service never half-applies.
    processing: AtomicBool,
}

impl Aggregator {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self {
            store,
            processing: AtomicBool::new(false),
        }
    }

    pub fn set_processing(&self, on: bool) {
        self.processing.store(on, Ordering::SeqCst);
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Insert the event and update every rollup it touches.
    pub async fn apply(&self, event: &FileEvent) -> Result<()> {
        self.store
            .insert_event(event)
            .await
            .context("Failed to record event")?;

        let date = day_of(&event.created_at);
        let hour = hour_of(&event.created_at);

        if let Err(e) = self.store.bump_daily(&date, event).await {
            error!(host_id = %event.host_id, error = %e, "Daily rollup update failed");
        }
        if let Err(e) = self.store.bump_hourly(&date, hour, &event.host_id).await {
            error!(host_id = %event.host_id, error = %e, "Hourly rollup update failed");
        }
        if let Err(e) = self.store.bump_directory(event).await {
            error!(host_id = %event.host_id, error = %e, "Directory rollup update failed");
        }

        debug!(
            host_id = %event.host_id,
            path = %event.file_path,
            event_type = %event.event_type.as_str(),
            "Applied file event"
        );

        Ok(())
    }
}

#[async_trait]
impl EventHandler for Aggregator {
    async fn handle(&self, event: FileEvent) -> Result<()> {
        if !self.is_processing() {
            debug!(host_id = %event.host_id, "Processing stopped, dropping event");
            return Ok(());
        }
        self.apply(&event).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessorState {
    Stopped,
    Initializing,
    Running,
}

/// Drives the consume loop against an [`Aggregator`].
pub struct EventProcessor {
    consumer: Arc<EventConsumer>,
    aggregator: Arc<Aggregator>,
    state: Mutex<ProcessorState>,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

impl EventProcessor {
    pub fn new(consumer: Arc<EventConsumer>, aggregator: Arc<Aggregator>) -> Self {
        Self {
            consumer,
            aggregator,
            state: Mutex::new(ProcessorState::Stopped),
            run_task: Mutex::new(None),
        }
    }

    pub fn aggregator(&self) -> Arc<Aggregator> {
        self.aggregator.clone()
    }

    /// Subscribe and start consuming. New messages only: the group offset
    /// policy means a fresh group starts at the log tail.
    pub async fn start(&self) -> Result<(), ProcessorError> {
        {
            let mut state = self.state.lock().await;
            if *state != ProcessorState::Stopped {
                return Err(ProcessorError::AlreadyRunning);
            }
            *state = ProcessorState::Initializing;
        }

        if let Err(e) = self.consumer.subscribe().await {
            *self.state.lock().await = ProcessorState::Stopped;
            return Err(ProcessorError::Unavailable(e.to_string()));
        }

        self.aggregator.set_processing(true);

        let consumer = self.consumer.clone();
        let aggregator = self.aggregator.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = consumer.run(aggregator).await {
                error!(error = %e, "Consume loop exited with error");
            }
        });

        *self.run_task.lock().await = Some(task);
        *self.state.lock().await = ProcessorState::Running;
        info!("Event processor running");

        Ok(())
    }

    /// Stop consuming. Safe to call before start or twice.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().await;
            if *state == ProcessorState::Stopped {
                return;
            }
            *state = ProcessorState::Stopped;
        }

        self.aggregator.set_processing(false);
        self.consumer.shutdown();

        if let Some(task) = self.run_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Consume task ended abnormally");
            }
        }

        info!("Event processor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tracker_pipeline::{classify, file_type_of, EventType, FileEvent};

    fn event(host: &str, path: &str, event_type: EventType, size: u64) -> FileEvent {
        let now = Utc::now();
        FileEvent {
            host_id: host.to_string(),
            file_path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
            file_type: file_type_of(path, false),
            size,
            created_at: now,
            modified_at: now,
            event_type,
            metadata: classify(path, false),
        }
    }

    #[tokio::test]
    async fn events_are_dropped_while_not_processing() {
        let store = Arc::new(EventStore::in_memory().await.unwrap());
        let aggregator = Aggregator::new(store.clone());

        aggregator
            .handle(event("host-a", "/tmp/a.txt", EventType::Created, 10))
            .await
            .unwrap();

        assert!(store.events(None, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn events_are_applied_while_processing() {
        let store = Arc::new(EventStore::in_memory().await.unwrap());
        let aggregator = Aggregator::new(store.clone());
        aggregator.set_processing(true);

        aggregator
            .handle(event("host-a", "/tmp/a.txt", EventType::Created, 10))
            .await
            .unwrap();

        let stored = store.events(None, 10, 0).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].host_id, "host-a");
    }

    #[tokio::test]
    async fn local_monitor_feeds_the_aggregator_directly() {
        use std::time::Duration;
        use tracker_pipeline::HostInfo;
        use tracker_watcher::{EventSink, FsMonitor, WatchConfig};

        let store = Arc::new(EventStore::in_memory().await.unwrap());
        let aggregator = Arc::new(Aggregator::new(store.clone()));
        aggregator.set_processing(true);

        let root = std::env::temp_dir().join(format!("tracker-local-{}", std::process::id()));
        tokio::fs::create_dir_all(&root).await.unwrap();

        let host = HostInfo {
            id: "aabbccddeeff".to_string(),
            mac_address: "aa:bb:cc:dd:ee:ff".to_string(),
            hostname: "local".to_string(),
            platform: "linux".to_string(),
            last_seen: Utc::now(),
        };
        let watch = WatchConfig {
            directories: vec![root.clone()],
            ..WatchConfig::default()
        };

        let monitor = FsMonitor::new(host, watch, EventSink::Handler(aggregator.clone()));
        monitor.start().await.unwrap();

        tokio::fs::write(root.join("note.txt"), b"hello").await.unwrap();

        let mut stored = Vec::new();
        for _ in 0..50 {
            stored = store.events(None, 10, 0).await.unwrap();
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        monitor.stop().await;
        let _ = tokio::fs::remove_dir_all(&root).await;

        assert!(stored.iter().any(|e| e.file_name == "note.txt"));
        assert_eq!(store.daily(Some("aabbccddeeff")).await.unwrap().len(), 1);
    }
}
