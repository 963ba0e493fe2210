use crate::errors::{AnalysisError, Result};
use std::path::PathBuf;

/// Where the classification API key comes from: a mounted secret file
/// first, an environment variable second.
///
/// Resolution happens per call rather than once at startup so a rotated
/// secret file takes effect without a restart.
#[derive(Clone, Debug)]
pub struct ApiKeySource {
    path: PathBuf,
    env: String,
}

impl ApiKeySource {
    pub fn new(path: impl Into<PathBuf>, env: impl Into<String>) -> Self {
        ApiKeySource {
            path: path.into(),
            env: env.into(),
        }
    }

    pub fn resolve(&self) -> Result<String> {
        if let Ok(key) = std::fs::read_to_string(&self.path) {
            let key = key.trim();
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }

        match std::env::var(&self.env) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(AnalysisError::MissingCredential(format!(
                "no key file at {} and ${} is unset",
                self.path.display(),
                self.env,
            ))),
        }
    }
}
