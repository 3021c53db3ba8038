//! Watcher service configuration.

use serde::Deserialize;
use std::path::PathBuf;
use tracker_pipeline::KafkaConfig;

/// Main configuration for the watcher service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub watch: WatchConfig,
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

/// Which directories to watch and what to ignore.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Directories to watch recursively.
    #[serde(default = "default_directories")]
    pub directories: Vec<PathBuf>,
    /// Path substrings to ignore. The defaults cover VCS directories, hidden
    /// path components (the "/." pattern) and common temp suffixes;
    /// overriding replaces the whole set.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    /// Maximum directory depth below a watched root.
    #[serde(default = "default_depth")]
    pub depth: usize,
}

fn default_service_name() -> String {
    "tracker-watcher".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_directories() -> Vec<PathBuf> {
    vec![PathBuf::from("./watched")]
}

fn default_ignore() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        ".git".to_string(),
        // Any hidden component: a path separator followed by a dot.
        "/.".to_string(),
        ".tmp".to_string(),
        ".temp".to_string(),
    ]
}

fn default_depth() -> usize {
    10
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directories: default_directories(),
            ignore: default_ignore(),
            depth: default_depth(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, optional config files and
    /// `TRACKER__`-prefixed environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/watcher").required(false))
            .add_source(config::File::with_name("/etc/file-tracker/watcher").required(false))
            .add_source(
                config::Environment::with_prefix("TRACKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_watch_config_has_sane_bounds() {
        let config = WatchConfig::default();
        assert_eq!(config.depth, 10);
        assert!(config.ignore.iter().any(|p| p == ".git"));
        assert!(config.ignore.iter().any(|p| p == "/."));
    }
}
