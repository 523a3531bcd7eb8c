//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared helpers
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CommonError {
    pub fn invalid_env(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
