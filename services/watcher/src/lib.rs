//! Tracker Watcher - filesystem monitoring for the file activity tracker.
//!
//! The binary in this crate watches directories and publishes events through
//! the broker. The monitor itself is exported so a consumer-side process can
//! run it co-located, feeding events straight into its own handler instead.

pub mod config;
pub mod monitor;

pub use config::{Config, ServiceConfig, WatchConfig};
pub use monitor::{EventSink, FsMonitor, MonitorError};
