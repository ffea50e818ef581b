//! Errors raised while loading or validating gateway configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration file does not exist: {0}")]
    NotFound(PathBuf),

    #[error("malformed configuration: {0}")]
    Parse(String),

    #[error("invalid '{field}': {message}")]
    Validation { field: String, message: String },
}

impl From<ConfigError> for crate::error::GatewayError {
    fn from(error: ConfigError) -> Self {
        crate::error::GatewayError::validation("BAD_CONFIG", error.to_string())
    }
}
