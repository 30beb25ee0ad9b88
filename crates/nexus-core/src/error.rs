//! Error types shared across Nexus crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NexusError>;

#[derive(Debug, Error)]
pub enum NexusError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("API key missing for provider: {0}")]
    ApiKeyMissing(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timed out after {0:?}: {1}")]
    Timeout(std::time::Duration, String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connector error: {0}")]
    Connector(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl NexusError {
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}
