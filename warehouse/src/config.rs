use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("warehouse URL must use http or https, got {0:?}")]
    UnsupportedScheme(String),

    #[error("statement timeout cannot be 0")]
    InvalidTimeout,

    #[error("token environment variable name cannot be empty")]
    EmptyTokenEnv,
}

/// Warehouse connection configuration
///
/// The session token is read from `token_path` first (the platform mounts
/// an OAuth token into the container at that path) and falls back to the
/// `token_env` environment variable for local runs.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct WarehouseConfig {
    /// Base URL of the warehouse account, e.g. "https://account.example.com"
    pub account_url: Url,
    /// Path to the mounted session token file
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    /// Environment variable holding the session token when no file is mounted
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Database to run statements against, if not implied by the session
    #[serde(default)]
    pub database: Option<String>,
    /// Schema to run statements against, if not implied by the session
    #[serde(default)]
    pub schema: Option<String>,
    /// Per-statement timeout passed to the statements API, in seconds
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

fn default_token_path() -> PathBuf {
    PathBuf::from("/snowflake/session/token")
}

fn default_token_env() -> String {
    "WAREHOUSE_TOKEN".to_string()
}

fn default_statement_timeout() -> u64 {
    30
}

impl WarehouseConfig {
    /// Validates the warehouse configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.account_url.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
        }

        if self.statement_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        if self.token_env.is_empty() {
            return Err(ValidationError::EmptyTokenEnv);
        }

        Ok(())
    }
}
