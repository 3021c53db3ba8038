//! Consume side of the pipeline.
//!
//! [`EventConsumer`] subscribes the broker client's group consumer to the
//! file-events topic and feeds each decoded [`FileEvent`] to a handler.
//! Malformed messages are logged and skipped; they must never stall the
//! loop. Shutdown is cooperative: a broadcast signal stops the loop without
//! aborting an in-flight handler call.

use crate::client::{BrokerClient, BrokerError};
use crate::event::{FileEvent, WireEvent};
use rdkafka::consumer::Consumer;
use rdkafka::message::Message;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Decode a message payload, dropping the transport timestamp the publisher
/// stamped on.
pub fn decode_event(payload: &[u8]) -> Result<FileEvent, serde_json::Error> {
    serde_json::from_slice::<WireEvent>(payload).map(|wire| wire.event)
}

/// Handler invoked for every well-formed event.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: FileEvent) -> anyhow::Result<()>;
}

pub struct EventConsumer {
    client: Arc<BrokerClient>,
    shutdown_tx: broadcast::Sender<()>,
}

impl EventConsumer {
    pub fn new(client: Arc<BrokerClient>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            client,
            shutdown_tx,
        }
    }

    /// Subscribe to the file-events topic from the current group offset.
    pub async fn subscribe(&self) -> Result<(), BrokerError> {
        let consumer = self.client.consumer().await?;
        let topic = self.client.config().topic.name.clone();
        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| BrokerError::Metadata(e.to_string()))?;
        info!(topic = %topic, "Subscribed to file events");
        Ok(())
    }

    /// Signal the run loop to stop after the in-flight message.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the consume loop until shutdown is signalled.
    ///
    /// Handler errors are per-event failures: logged, never fatal, and the
    /// message is not redelivered.
    pub async fn run<H: EventHandler>(&self, handler: Arc<H>) -> Result<(), BrokerError> {
        use tokio_stream::StreamExt;

        let consumer = self.client.consumer().await?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let stream = consumer.stream();
        tokio::pin!(stream);

        info!("Starting event consumption loop");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Consumer received shutdown signal");
                    break;
                }
                message_result = stream.next() => {
                    match message_result {
                        Some(Ok(message)) => {
                            let partition = message.partition();
                            let offset = message.offset();

                            let Some(payload) = message.payload() else {
                                warn!(partition, offset, "Received message with no value, skipping");
                                continue;
                            };

                            let event = match decode_event(payload) {
                                Ok(event) => event,
                                Err(e) => {
                                    warn!(
                                        partition,
                                        offset,
                                        error = %e,
                                        "Skipping malformed message"
                                    );
                                    continue;
                                }
                            };

                            debug!(
                                partition,
                                offset,
                                host_id = %event.host_id,
                                "Consumed file event"
                            );

                            if let Err(e) = handler.handle(event).await {
                                error!(partition, offset, error = %e, "Event handler failed");
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Kafka consumer error");
                        }
                        None => {
                            debug!("Consumer stream ended");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KafkaConfig;

    #[test]
    fn shutdown_without_subscribers_does_not_panic() {
        let consumer = EventConsumer::new(Arc::new(BrokerClient::new(KafkaConfig::default())));
        consumer.shutdown();
        consumer.shutdown();
    }

    #[test]
    fn malformed_payload_fails_decode_without_poisoning_the_next() {
        assert!(decode_event(b"not json at all").is_err());
        assert!(decode_event(b"{\"hostId\":\"h1\"}").is_err());

        let valid = br#"{
            "hostId": "h1",
            "filePath": "/a/b.txt",
            "fileName": "b.txt",
            "fileType": "document",
            "size": 100,
            "createdAt": "2024-06-01T09:00:00Z",
            "modifiedAt": "2024-06-01T09:00:00Z",
            "eventType": "created",
            "metadata": {
                "extension": ".txt",
                "mimeType": "text/plain",
                "category": "document",
                "isDirectory": false
            },
            "timestamp": "2024-06-01T09:00:01Z"
        }"#;
        let event = decode_event(valid).unwrap();
        assert_eq!(event.host_id, "h1");
        assert_eq!(event.size, 100);
    }
}
