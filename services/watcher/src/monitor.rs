//! Filesystem monitoring.
//!
//! [`FsMonitor`] owns one recursive watch per configured directory and turns
//! raw notifications into fully-formed [`FileEvent`]s. Only subsequent
//! changes are reported: the pre-existing tree is never replayed into the
//! pipeline on startup. Each finished event goes to exactly one sink chosen
//! at construction: a directly-injected handler (when monitor and consumer
//! are co-located) or the event publisher.

use crate::config::WatchConfig;
use chrono::{DateTime, Utc};
use notify::event::{CreateKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracker_pipeline::{
    classify, file_type_of, EventHandler, EventPublisher, EventType, FileEvent, HostInfo,
};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor is already watching")]
    AlreadyWatching,

    #[error("No watchable directories (all {failed} configured paths failed)")]
    NoWatchableDirectories { failed: usize },
}

/// Where finished events are delivered.
pub enum EventSink {
    /// Publish through the broker.
    Publisher(Arc<EventPublisher>),
    /// Hand directly to an in-process handler, bypassing the broker.
    Handler(Arc<dyn EventHandler>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    Idle,
    Watching,
    Stopped,
}

/// A raw notification as it leaves the watcher callback thread.
struct RawChange {
    root: PathBuf,
    path: PathBuf,
    event_type: EventType,
    is_directory: bool,
}

pub struct FsMonitor {
    host: HostInfo,
    config: WatchConfig,
    sink: Arc<EventSink>,
    state: Mutex<WatchState>,
    watchers: Mutex<Vec<RecommendedWatcher>>,
    forward_task: Mutex<Option<JoinHandle<()>>>,
}

impl FsMonitor {
    pub fn new(host: HostInfo, config: WatchConfig, sink: EventSink) -> Self {
        Self {
            host,
            config,
            sink: Arc::new(sink),
            state: Mutex::new(WatchState::Idle),
            watchers: Mutex::new(Vec::new()),
            forward_task: Mutex::new(None),
        }
    }

    /// Begin watching the configured directories.
    ///
    /// Per-path failures degrade partially: a directory that cannot be
    /// watched is logged and skipped while the rest keep watching. Only a
    /// total failure is an error.
    pub async fn start(&self) -> Result<(), MonitorError> {
        {
            let mut state = self.state.lock().await;
            if *state == WatchState::Watching {
                return Err(MonitorError::AlreadyWatching);
            }
            *state = WatchState::Watching;
        }

        info!(
            host = %self.host.hostname,
            host_id = %self.host.id,
            directories = ?self.config.directories,
            "Starting file watcher"
        );

        let (tx, rx) = mpsc::unbounded_channel::<RawChange>();
        let mut watchers = Vec::new();
        let mut failed = 0usize;

        for dir in &self.config.directories {
            match spawn_watcher(dir, tx.clone()) {
                Ok(watcher) => {
                    info!(path = %dir.display(), "Watching directory");
                    watchers.push(watcher);
                }
                Err(e) => {
                    error!(path = %dir.display(), error = %e, "Failed to watch directory");
                    failed += 1;
                }
            }
        }
        // Callbacks hold the only remaining senders; dropping the watchers
        // later closes the channel and ends the forward task.
        drop(tx);

        if watchers.is_empty() {
            *self.state.lock().await = WatchState::Stopped;
            return Err(MonitorError::NoWatchableDirectories { failed });
        }

        *self.watchers.lock().await = watchers;

        let host_id = self.host.id.clone();
        let config = self.config.clone();
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            forward_loop(rx, host_id, config, sink).await;
        });
        *self.forward_task.lock().await = Some(task);

        Ok(())
    }

    /// Release the watch handles and, when the broker sink is in use, tear
    /// down its connection. Safe to call before `start` or more than once.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().await;
            if *state != WatchState::Watching {
                *state = WatchState::Stopped;
                return;
            }
            *state = WatchState::Stopped;
        }

        // Dropping the watchers closes the raw-change channel, which lets
        // the forward task drain and exit on its own.
        self.watchers.lock().await.clear();

        if let Some(task) = self.forward_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Forward task did not shut down cleanly");
            }
        }

        if let EventSink::Publisher(publisher) = self.sink.as_ref() {
            publisher.shutdown().await;
        }

        info!("File watcher stopped");
    }
}

/// Create one recursive watcher for a root directory, bridging its callback
/// thread into the async forward loop.
fn spawn_watcher(
    root: &Path,
    tx: mpsc::UnboundedSender<RawChange>,
) -> notify::Result<RecommendedWatcher> {
    let root_buf = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if let Some((event_type, is_directory)) = interpret_kind(&event) {
                    for path in &event.paths {
                        let is_directory =
                            is_directory.unwrap_or_else(|| path.is_dir());
                        let _ = tx.send(RawChange {
                            root: root_buf.clone(),
                            path: path.clone(),
                            event_type,
                            is_directory,
                        });
                    }
                }
            }
            // Watcher-level errors degrade this root only; other paths keep
            // their own watchers.
            Err(e) => error!(error = %e, "File watcher error"),
        },
        notify::Config::default(),
    )?;

    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Map a notify event kind to our event type. Access and metadata-only
/// notifications are dropped.
fn interpret_kind(event: &Event) -> Option<(EventType, Option<bool>)> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Some((EventType::Created, Some(true))),
        EventKind::Create(CreateKind::File) => Some((EventType::Created, Some(false))),
        EventKind::Create(_) => Some((EventType::Created, None)),
        EventKind::Modify(_) => Some((EventType::Modified, None)),
        EventKind::Remove(RemoveKind::Folder) => Some((EventType::Deleted, Some(true))),
        EventKind::Remove(RemoveKind::File) => Some((EventType::Deleted, Some(false))),
        // The inode is gone; nothing left to probe.
        EventKind::Remove(_) => Some((EventType::Deleted, Some(false))),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

async fn forward_loop(
    mut rx: mpsc::UnboundedReceiver<RawChange>,
    host_id: String,
    config: WatchConfig,
    sink: Arc<EventSink>,
) {
    while let Some(change) = rx.recv().await {
        if !accepts(&config, &change.root, &change.path) {
            continue;
        }

        let event = build_event(&host_id, &change).await;

        debug!(
            event_type = event.event_type.as_str(),
            path = %event.file_path,
            category = event.metadata.category.as_str(),
            "File event"
        );

        match sink.as_ref() {
            EventSink::Publisher(publisher) => {
                if let Err(e) = publisher.publish(&event).await {
                    error!(path = %event.file_path, error = %e, "Failed to publish file event");
                }
            }
            EventSink::Handler(handler) => {
                if let Err(e) = handler.handle(event.clone()).await {
                    error!(path = %event.file_path, error = %e, "Event handler failed");
                }
            }
        }
    }
}

/// Depth bound and exclusion rules for one notification path. All exclusions
/// beyond the depth bound come from the configured ignore list, so an
/// override can re-enable anything the defaults drop, hidden files included.
fn accepts(config: &WatchConfig, root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    if relative.components().count() > config.depth {
        return false;
    }

    let path_str = path.to_string_lossy();
    !config.ignore.iter().any(|pattern| path_str.contains(pattern))
}

/// Build the full event record for one raw change.
///
/// Create/modify events stat the path synchronously at notification time; a
/// stat failure logs a warning and substitutes zero size and current
/// timestamps rather than failing the event. Deletes never stat.
async fn build_event(host_id: &str, change: &RawChange) -> FileEvent {
    let file_path = change.path.to_string_lossy().to_string();
    let file_name = change
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.clone());

    let mut size = 0u64;
    let mut created_at = Utc::now();
    let mut modified_at = created_at;

    if change.event_type != EventType::Deleted {
        match tokio::fs::metadata(&change.path).await {
            Ok(meta) => {
                size = if meta.is_dir() { 0 } else { meta.len() };
                if let Ok(time) = meta.created() {
                    created_at = DateTime::<Utc>::from(time);
                }
                if let Ok(time) = meta.modified() {
                    modified_at = DateTime::<Utc>::from(time);
                }
            }
            Err(e) => {
                warn!(path = %file_path, error = %e, "Could not stat path, using defaults");
            }
        }
    }

    FileEvent {
        host_id: host_id.to_string(),
        file_name,
        file_type: file_type_of(&file_path, change.is_directory),
        size,
        created_at,
        modified_at,
        event_type: change.event_type,
        metadata: classify(&file_path, change.is_directory),
        file_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch_config() -> WatchConfig {
        WatchConfig::default()
    }

    #[test]
    fn hidden_and_ignored_paths_are_excluded() {
        let config = watch_config();
        let root = Path::new("/watch");

        assert!(!accepts(&config, root, Path::new("/watch/.hidden/file.txt")));
        assert!(!accepts(
            &config,
            root,
            Path::new("/watch/project/node_modules/pkg/index.js")
        ));
        assert!(!accepts(&config, root, Path::new("/watch/scratch/file.tmp")));
        assert!(accepts(&config, root, Path::new("/watch/docs/report.pdf")));
    }

    #[test]
    fn depth_bound_is_enforced() {
        let mut config = watch_config();
        config.depth = 2;
        let root = Path::new("/watch");

        assert!(accepts(&config, root, Path::new("/watch/a/b.txt")));
        assert!(!accepts(&config, root, Path::new("/watch/a/b/c.txt")));
    }

    #[test]
    fn override_replaces_default_exclusions() {
        let mut config = watch_config();
        config.ignore = vec!["target".to_string()];
        let root = Path::new("/watch");

        assert!(accepts(
            &config,
            root,
            Path::new("/watch/project/node_modules/pkg/index.js")
        ));
        assert!(!accepts(
            &config,
            root,
            Path::new("/watch/project/target/debug/app")
        ));
    }

    #[test]
    fn override_can_re_enable_hidden_paths() {
        let mut config = watch_config();
        config.ignore = vec!["node_modules".to_string()];
        let root = Path::new("/watch");

        assert!(accepts(&config, root, Path::new("/watch/.dotdir/file.txt")));
        assert!(accepts(&config, root, Path::new("/watch/notes/.plan")));

        config.ignore.clear();
        assert!(accepts(&config, root, Path::new("/watch/.dotdir/file.txt")));
    }

    #[tokio::test]
    async fn deleted_events_carry_zero_size() {
        let change = RawChange {
            root: PathBuf::from("/watch"),
            path: PathBuf::from("/watch/gone.txt"),
            event_type: EventType::Deleted,
            is_directory: false,
        };

        let event = build_event("h1", &change).await;
        assert_eq!(event.size, 0);
        assert_eq!(event.event_type, EventType::Deleted);
        assert_eq!(event.file_name, "gone.txt");
    }

    #[tokio::test]
    async fn stat_failure_substitutes_defaults() {
        let change = RawChange {
            root: PathBuf::from("/watch"),
            path: PathBuf::from("/watch/never-existed.bin"),
            event_type: EventType::Created,
            is_directory: false,
        };

        let event = build_event("h1", &change).await;
        assert_eq!(event.size, 0);
        assert_eq!(event.event_type, EventType::Created);
    }

    #[tokio::test]
    async fn stop_before_start_is_safe() {
        let host = HostInfo {
            id: "h1".to_string(),
            mac_address: "aa:bb:cc:dd:ee:ff".to_string(),
            hostname: "test".to_string(),
            platform: "linux".to_string(),
            last_seen: Utc::now(),
        };

        struct NullHandler;
        #[tracker_pipeline::async_trait]
        impl EventHandler for NullHandler {
            async fn handle(&self, _event: FileEvent) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let monitor = FsMonitor::new(
            host,
            watch_config(),
            EventSink::Handler(Arc::new(NullHandler)),
        );
        monitor.stop().await;
        monitor.stop().await;
    }
}
