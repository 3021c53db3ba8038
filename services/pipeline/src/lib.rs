//! Tracker Pipeline - Kafka event pipeline for the file activity tracker.
//!
//! This library is the shared core between the watcher (producer side) and
//! the aggregator (consumer side). It provides:
//!
//! - The immutable [`event::FileEvent`] model and its JSON wire form
//! - Pure extension-based file classification
//! - Stable host identity derived from the machine's hardware address
//! - A broker client owning producer/consumer/admin connection lifecycle
//! - A publisher keyed by host id and a consumer with per-event handlers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracker_pipeline::{BrokerClient, EventPublisher, KafkaConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(BrokerClient::new(KafkaConfig::default()));
//!     let publisher = EventPublisher::new(client);
//!     publisher.initialize().await?;
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod client;
pub mod config;
pub mod consumer;
pub mod event;
pub mod host;
pub mod publisher;

// Re-export main types
pub use classify::{classify, file_type_of};
pub use client::{BrokerClient, BrokerError};
pub use config::{ConfigError, ConsumerConfig, KafkaConfig, ReliabilityConfig, TopicConfig};
pub use consumer::{decode_event, EventConsumer, EventHandler};
pub use event::{
    EventType, FileCategory, FileEvent, FileMetadata, FileType, HostInfo, WireEvent,
};
pub use host::{resolve_host, HostIdentityError};
pub use publisher::{Delivery, EventPublisher, EventSubmission, PublishError, SubmitError};

/// Async trait re-export for handler implementations.
pub use async_trait::async_trait;
