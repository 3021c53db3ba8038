//! Tracker Aggregator - consumes file events and maintains analytics rollups.
//!
//! The aggregator is the consume side of the pipeline: it subscribes to the
//! file-events topic, appends every event to an embedded SQLite raw log and
//! keeps three incremental rollups (daily, hourly, per-directory) current.
//! Processing is at-least-once; the rollup updates are commutative deltas so
//! replays shift counts but never corrupt structure.

pub mod config;
pub mod processor;
pub mod store;

pub use config::{Config, DatabaseConfig, LocalWatchConfig, ServiceConfig};
pub use processor::{Aggregator, EventProcessor, ProcessorError};
pub use store::{
    ActivityStats, DailyAnalytics, DirectoryAnalytics, EventStore, HostRow, HourlyAnalytics,
    StoredEvent, TypeDistribution,
};
