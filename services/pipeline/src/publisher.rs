//! Event publishing.
//!
//! [`EventPublisher`] wraps the broker client's producer: it serializes an
//! event together with a wall-clock send timestamp, keys the message by host
//! id (all events from one host land on the same partition and are consumed
//! in per-host order) and sends it to the single configured topic. Send
//! failures propagate to the caller un-retried; the boundary that calls the
//! publisher decides policy.

use crate::classify::{classify, file_type_of};
use crate::client::{BrokerClient, BrokerError};
use crate::event::{EventType, FileEvent, FileMetadata, FileType, WireEvent};
use chrono::{DateTime, Utc};
use rdkafka::producer::FutureRecord;
use rdkafka::util::Timeout;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publisher is not initialized")]
    NotInitialized,

    #[error("Broker is unreachable")]
    Unreachable,

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    #[error("Failed to send event to topic {topic}: {message}")]
    Send { topic: String, message: String },
}

/// Where the broker placed a published event.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Producer-side entry point to the pipeline.
pub struct EventPublisher {
    client: Arc<BrokerClient>,
    initialized: AtomicBool,
}

impl EventPublisher {
    pub fn new(client: Arc<BrokerClient>) -> Self {
        Self {
            client,
            initialized: AtomicBool::new(false),
        }
    }

    /// Verify connectivity and provision the topic. Must complete before the
    /// first `publish`; calling `publish` earlier is a programming error.
    pub async fn initialize(&self) -> Result<(), PublishError> {
        if !self.client.check_connection().await {
            return Err(PublishError::Unreachable);
        }
        self.client.ensure_topics().await?;
        self.initialized.store(true, Ordering::SeqCst);
        info!(topic = %self.client.config().topic.name, "Event publisher initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Publish one event, keyed by host id.
    pub async fn publish(&self, event: &FileEvent) -> Result<Delivery, PublishError> {
        if !self.is_initialized() {
            return Err(PublishError::NotInitialized);
        }

        let wire = WireEvent {
            event: event.clone(),
            timestamp: Utc::now(),
        };
        let payload =
            serde_json::to_vec(&wire).map_err(|e| PublishError::Serialization(e.to_string()))?;

        let config = self.client.config();
        let topic = config.topic.name.clone();
        let producer = self.client.producer().await?;

        let record = FutureRecord::to(&topic)
            .key(event.host_id.as_str())
            .payload(&payload);

        let (partition, offset) = producer
            .send(record, Timeout::After(config.request_timeout()))
            .await
            .map_err(|(e, _)| PublishError::Send {
                topic: topic.clone(),
                message: e.to_string(),
            })?;

        debug!(
            host_id = %event.host_id,
            event_type = event.event_type.as_str(),
            path = %event.file_path,
            partition,
            offset,
            "Published file event"
        );

        Ok(Delivery {
            topic,
            partition,
            offset,
        })
    }

    /// Tear down the producer side of the broker connection.
    pub async fn shutdown(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.client.disconnect().await;
    }
}

/// A partially-specified event handed in at the ingress boundary by external
/// producers. Everything beyond the three required fields is filled in from
/// classification and defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSubmission {
    pub host_id: Option<String>,
    pub file_path: Option<String>,
    pub event_type: Option<EventType>,
    pub file_name: Option<String>,
    pub file_type: Option<FileType>,
    #[serde(default)]
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub metadata: Option<FileMetadata>,
}

#[derive(Error, Debug)]
pub enum SubmitError {
    /// Malformed input; the caller should discard, not retry.
    #[error("Invalid file event, missing required fields: {}", missing.join(", "))]
    Invalid { missing: Vec<&'static str> },

    /// The queue is unavailable; the caller may buffer and retry.
    #[error("Event queue unavailable: {0}")]
    Unavailable(#[from] PublishError),
}

impl EventSubmission {
    /// Validate required fields and build the full event record.
    pub fn into_event(self) -> Result<FileEvent, SubmitError> {
        let mut missing = Vec::new();
        if self.host_id.is_none() {
            missing.push("hostId");
        }
        if self.file_path.is_none() {
            missing.push("filePath");
        }
        if self.event_type.is_none() {
            missing.push("eventType");
        }
        if !missing.is_empty() {
            return Err(SubmitError::Invalid { missing });
        }

        let file_path = self.file_path.unwrap();
        let is_directory = self.metadata.as_ref().map_or(false, |m| m.is_directory);
        let metadata = self
            .metadata
            .unwrap_or_else(|| classify(&file_path, is_directory));
        let now = Utc::now();

        Ok(FileEvent {
            host_id: self.host_id.unwrap(),
            file_name: self.file_name.unwrap_or_else(|| {
                file_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(file_path.as_str())
                    .to_string()
            }),
            file_type: self
                .file_type
                .unwrap_or_else(|| file_type_of(&file_path, is_directory)),
            size: self.size,
            created_at: self.created_at.unwrap_or(now),
            modified_at: self.modified_at.unwrap_or(now),
            event_type: self.event_type.unwrap(),
            metadata,
            file_path,
        })
    }
}

impl EventPublisher {
    /// Ingress operation for external event sources: validate, then hand off
    /// to the pipeline. The two error variants let the caller distinguish
    /// "malformed input" from "queue unavailable, retry".
    pub async fn submit(&self, submission: EventSubmission) -> Result<Delivery, SubmitError> {
        let event = submission.into_event()?;
        Ok(self.publish(&event).await?)
    }
}
