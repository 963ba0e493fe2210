use analysis::ClassifierConfig;
use analysis::store::validate_table_name;
use serde::Deserialize;
use std::fs::File;
use warehouse::WarehouseConfig;
use warehouse::references::validate_reference_name;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid listener: {0}")]
    InvalidListener(String),
    #[error("invalid warehouse section: {0}")]
    InvalidWarehouse(#[from] warehouse::config::ValidationError),
    #[error("sample_limit must be between 1 and 5, got {0}")]
    InvalidSampleLimit(usize),
    #[error("invalid app section: {0}")]
    InvalidApp(#[from] warehouse::WarehouseError),
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

/// Application-level settings: which reference is probed, where history
/// rows go, and how many sample rows diagnostics return.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AppSettings {
    #[serde(default = "default_consumer_reference")]
    pub consumer_reference: String,
    #[serde(default = "default_history_table")]
    pub history_table: String,
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
    /// Whether analyses are written to the history table
    #[serde(default = "default_persist_feedback")]
    pub persist_feedback: bool,
}

fn default_consumer_reference() -> String {
    "CONSUMER_TABLE".to_string()
}

fn default_history_table() -> String {
    "FEEDBACK_HISTORY".to_string()
}

fn default_sample_limit() -> usize {
    3
}

fn default_persist_feedback() -> bool {
    true
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            consumer_reference: default_consumer_reference(),
            history_table: default_history_table(),
            sample_limit: default_sample_limit(),
            persist_feedback: default_persist_feedback(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub listener: Listener,
    pub warehouse: WarehouseConfig,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listener.port == 0 {
            return Err(ConfigError::InvalidListener("port cannot be 0".to_string()));
        }
        self.warehouse.validate()?;

        if !(1..=5).contains(&self.app.sample_limit) {
            return Err(ConfigError::InvalidSampleLimit(self.app.sample_limit));
        }
        validate_reference_name(&self.app.consumer_reference)?;
        validate_table_name(&self.app.history_table)?;

        Ok(())
    }
}
