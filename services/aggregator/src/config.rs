//! Aggregator service configuration.

use serde::Deserialize;
use tracker_pipeline::KafkaConfig;
use tracker_watcher::WatchConfig;

/// Main configuration for the aggregator service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub watch: LocalWatchConfig,
}

/// Optional co-located monitor: watch directories in this process and feed
/// events straight to the aggregator, bypassing the broker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalWatchConfig {
    /// Off by default; the normal topology consumes from the broker.
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: WatchConfig,
}

/// Service-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Embedded database settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_service_name() -> String {
    "tracker-aggregator".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_url() -> String {
    "sqlite://file_tracker.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, optional config files and
    /// `TRACKER__`-prefixed environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/aggregator").required(false))
            .add_source(config::File::with_name("/etc/file-tracker/aggregator").required(false))
            .add_source(
                config::Environment::with_prefix("TRACKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
