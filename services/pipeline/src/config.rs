//! Kafka configuration for the tracker pipeline.
//!
//! The structures deserialize with serde defaults so each binary can embed
//! them in its own layered `config`-crate loader and override any field from
//! file or environment.

use rdkafka::config::ClientConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Retry and delivery-reliability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Broker-level retries for a single send.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Backoff between broker-level retries in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Connection establishment timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Bounded attempts for the startup connect loop in the binaries.
    #[serde(default = "default_startup_attempts")]
    pub startup_attempts: u32,
    /// Fixed delay between startup connect attempts in milliseconds.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
}

fn default_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_connection_timeout_ms() -> u64 {
    3_000
}

fn default_startup_attempts() -> u32 {
    5
}

fn default_startup_delay_ms() -> u64 {
    2_000
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
            startup_attempts: default_startup_attempts(),
            startup_delay_ms: default_startup_delay_ms(),
        }
    }
}

/// Consumer-group settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Consumer group ID; one member of the group owns each partition.
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Where to start when the group has no committed offset. The aggregator
    /// consumes from the current offset, not from the beginning.
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
}

fn default_group_id() -> String {
    "file-tracker-consumer-group".to_string()
}

fn default_auto_offset_reset() -> String {
    "latest".to_string()
}

fn default_session_timeout() -> u64 {
    30_000
}

fn default_heartbeat_interval() -> u64 {
    3_000
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            auto_offset_reset: default_auto_offset_reset(),
            session_timeout_ms: default_session_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
        }
    }
}

/// The single file-events topic and its provisioning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    #[serde(default = "default_topic_name")]
    pub name: String,
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    #[serde(default = "default_replication")]
    pub replication: i32,
    /// Log retention; events older than this are unrecoverable if unconsumed.
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,
}

fn default_topic_name() -> String {
    "file-events".to_string()
}

fn default_partitions() -> i32 {
    3
}

fn default_replication() -> i32 {
    1
}

fn default_retention_ms() -> u64 {
    7 * 24 * 60 * 60 * 1000
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            name: default_topic_name(),
            partitions: default_partitions(),
            replication: default_replication(),
            retention_ms: default_retention_ms(),
        }
    }
}

/// Main Kafka configuration for the tracker pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated broker address list.
    #[serde(default = "default_brokers")]
    pub brokers: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub topic: TopicConfig,
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_client_id() -> String {
    "file-tracker".to_string()
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            client_id: default_client_id(),
            reliability: ReliabilityConfig::default(),
            consumer: ConsumerConfig::default(),
            topic: TopicConfig::default(),
        }
    }
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            ..Default::default()
        }
    }

    fn build_base_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        config.set("client.id", &self.client_id);
        config.set(
            "socket.connection.setup.timeout.ms",
            self.reliability.connection_timeout_ms.to_string(),
        );
        config
    }

    /// Producer settings: idempotent delivery with one in-flight request so
    /// broker-level retries cannot reorder or duplicate.
    pub fn build_producer_config(&self) -> ClientConfig {
        let mut config = self.build_base_config();
        config.set("enable.idempotence", "true");
        config.set("max.in.flight.requests.per.connection", "1");
        config.set("retries", self.reliability.retries.to_string());
        config.set(
            "retry.backoff.ms",
            self.reliability.retry_backoff_ms.to_string(),
        );
        config.set(
            "request.timeout.ms",
            self.reliability.request_timeout_ms.to_string(),
        );
        config.set("acks", "all");
        config
    }

    /// Admin/metadata client settings: connection parameters only.
    pub fn build_admin_config(&self) -> ClientConfig {
        self.build_base_config()
    }

    pub fn build_consumer_config(&self) -> ClientConfig {
        let mut config = self.build_base_config();
        config.set("group.id", &self.consumer.group_id);
        config.set("auto.offset.reset", &self.consumer.auto_offset_reset);
        config.set("enable.auto.commit", "true");
        config.set(
            "session.timeout.ms",
            self.consumer.session_timeout_ms.to_string(),
        );
        config.set(
            "heartbeat.interval.ms",
            self.consumer.heartbeat_interval_ms.to_string(),
        );
        config
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.reliability.request_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.reliability.connection_timeout_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.reliability.startup_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers.is_empty() {
            return Err(ConfigError::MissingRequired("brokers".to_string()));
        }
        if self.consumer.group_id.is_empty() {
            return Err(ConfigError::MissingRequired("consumer.group_id".to_string()));
        }
        if self.topic.name.is_empty() {
            return Err(ConfigError::MissingRequired("topic.name".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KafkaConfig::default();
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.topic.name, "file-events");
        assert_eq!(config.topic.partitions, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_producer_config_is_idempotent() {
        let config = KafkaConfig::new("localhost:9092");
        let producer_config = config.build_producer_config();

        assert_eq!(producer_config.get("enable.idempotence"), Some("true"));
        assert_eq!(
            producer_config.get("max.in.flight.requests.per.connection"),
            Some("1")
        );
    }

    #[test]
    fn test_consumer_config_starts_from_latest() {
        let config = KafkaConfig::new("localhost:9092");
        let consumer_config = config.build_consumer_config();

        assert_eq!(
            consumer_config.get("group.id"),
            Some("file-tracker-consumer-group")
        );
        assert_eq!(consumer_config.get("auto.offset.reset"), Some("latest"));
    }

    #[test]
    fn test_validate_rejects_empty_brokers() {
        let config = KafkaConfig::new("");
        assert!(config.validate().is_err());
    }
}
