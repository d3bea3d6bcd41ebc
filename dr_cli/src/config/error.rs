//! Configuration errors.

use thiserror::Error;

/// Errors produced when building or validating configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Configuration values are inconsistent or out of range.
    #[error("config validation: {0}")]
    Validation(String),

    /// An environment variable could not be read (e.g. invalid Unicode).
    #[error("env var {key}: {message}")]
    EnvVar { key: String, message: String },

    /// An environment variable was set but could not be parsed into the expected type.
    #[error("env var {key}={value:?}: {message}")]
    Parse {
        key: String,
        value: String,
        message: String,
    },
}
