//! Broker connection lifecycle.
//!
//! [`BrokerClient`] owns the three logical Kafka connections (producer,
//! consumer and admin), each created lazily on first use and cached for
//! reuse. There is no ambient singleton: whichever component starts the
//! pipeline constructs one client and passes it by reference to the publisher
//! and consumer. The client performs no reconnection loop of its own;
//! startup-time retry policy lives with the caller.

use crate::config::KafkaConfig;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::StreamConsumer;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::producer::FutureProducer;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Failed to create {role} client: {message}")]
    Creation { role: &'static str, message: String },

    #[error("Broker metadata request failed: {0}")]
    Metadata(String),

    #[error("Failed to create topic {topic}: {message}")]
    TopicCreation { topic: String, message: String },
}

/// Shared handle to the broker, owning all three connection roles.
pub struct BrokerClient {
    config: Arc<KafkaConfig>,
    producer: Mutex<Option<Arc<FutureProducer>>>,
    consumer: Mutex<Option<Arc<StreamConsumer>>>,
    admin: Mutex<Option<Arc<AdminClient<DefaultClientContext>>>>,
}

impl BrokerClient {
    pub fn new(config: KafkaConfig) -> Self {
        Self {
            config: Arc::new(config),
            producer: Mutex::new(None),
            consumer: Mutex::new(None),
            admin: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    /// Lazily-created idempotent producer, cached across calls.
    pub async fn producer(&self) -> Result<Arc<FutureProducer>, BrokerError> {
        let mut slot = self.producer.lock().await;
        if let Some(producer) = slot.as_ref() {
            return Ok(producer.clone());
        }

        let producer: FutureProducer = self
            .config
            .build_producer_config()
            .create()
            .map_err(|e| BrokerError::Creation {
                role: "producer",
                message: e.to_string(),
            })?;

        info!(brokers = %self.config.brokers, "Kafka producer connected");
        let producer = Arc::new(producer);
        *slot = Some(producer.clone());
        Ok(producer)
    }

    /// Lazily-created group consumer, cached across calls.
    pub async fn consumer(&self) -> Result<Arc<StreamConsumer>, BrokerError> {
        let mut slot = self.consumer.lock().await;
        if let Some(consumer) = slot.as_ref() {
            return Ok(consumer.clone());
        }

        let consumer: StreamConsumer = self
            .config
            .build_consumer_config()
            .create()
            .map_err(|e| BrokerError::Creation {
                role: "consumer",
                message: e.to_string(),
            })?;

        info!(
            brokers = %self.config.brokers,
            group = %self.config.consumer.group_id,
            "Kafka consumer connected"
        );
        let consumer = Arc::new(consumer);
        *slot = Some(consumer.clone());
        Ok(consumer)
    }

    async fn admin(&self) -> Result<Arc<AdminClient<DefaultClientContext>>, BrokerError> {
        let mut slot = self.admin.lock().await;
        if let Some(admin) = slot.as_ref() {
            return Ok(admin.clone());
        }

        let admin: AdminClient<DefaultClientContext> = self
            .config
            .build_admin_config()
            .create()
            .map_err(|e| BrokerError::Creation {
                role: "admin",
                message: e.to_string(),
            })?;

        debug!(brokers = %self.config.brokers, "Kafka admin client connected");
        let admin = Arc::new(admin);
        *slot = Some(admin.clone());
        Ok(admin)
    }

    /// Probe connectivity by listing topics through the admin connection.
    /// Any failure is reported as "not connected" rather than propagated.
    pub async fn check_connection(&self) -> bool {
        match self.list_topics().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Broker connection check failed");
                false
            }
        }
    }

    /// Names of the topics currently known to the broker.
    ///
    /// The metadata fetch is a blocking librdkafka call, so it runs on the
    /// blocking pool instead of stalling the event loop.
    pub async fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        let admin = self.admin().await?;
        let timeout = self.config.connection_timeout();

        tokio::task::spawn_blocking(move || {
            let metadata = admin
                .inner()
                .fetch_metadata(None, timeout)
                .map_err(|e| BrokerError::Metadata(e.to_string()))?;

            Ok(metadata
                .topics()
                .iter()
                .map(|t| t.name().to_string())
                .collect())
        })
        .await
        .map_err(|e| BrokerError::Metadata(e.to_string()))?
    }

    /// Idempotent topic provisioning: compare the desired topic against the
    /// existing set and only issue a create call for what is missing. A
    /// concurrent creator winning the race is treated as success.
    pub async fn ensure_topics(&self) -> Result<(), BrokerError> {
        let existing = self.list_topics().await?;
        let topic = &self.config.topic;

        if existing.iter().any(|name| name == &topic.name) {
            debug!(topic = %topic.name, "Topic already exists");
            return Ok(());
        }

        let retention = topic.retention_ms.to_string();
        let new_topic = NewTopic::new(
            &topic.name,
            topic.partitions,
            TopicReplication::Fixed(topic.replication),
        )
        .set("cleanup.policy", "delete")
        .set("retention.ms", &retention);

        let admin = self.admin().await?;
        let results = admin
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|e| BrokerError::TopicCreation {
                topic: topic.name.clone(),
                message: e.to_string(),
            })?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "Created Kafka topic"),
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %topic.name, "Topic created concurrently")
                }
                Err((name, code)) => {
                    return Err(BrokerError::TopicCreation {
                        topic: name,
                        message: code.to_string(),
                    })
                }
            }
        }

        Ok(())
    }

    /// Tear down whichever of the three connections are live, concurrently,
    /// and reset the slots so a later start re-establishes cleanly.
    pub async fn disconnect(&self) {
        let (mut producer, mut consumer, mut admin) = tokio::join!(
            self.producer.lock(),
            self.consumer.lock(),
            self.admin.lock()
        );

        let had_producer = producer.take().is_some();
        let had_consumer = consumer.take().is_some();
        let had_admin = admin.take().is_some();

        if had_producer || had_consumer || had_admin {
            info!(
                producer = had_producer,
                consumer = had_consumer,
                admin = had_admin,
                "Broker client disconnected"
            );
        }
    }
}
