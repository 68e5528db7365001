//! Shared error types.

use thiserror::Error;

/// Errors raised while resolving configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The environment variable name.
        key: String,
        /// Why the value was rejected.
        message: String,
    },

    /// An environment variable was present but not valid unicode.
    #[error("Environment variable {key} is not valid unicode")]
    NotUnicode {
        /// The environment variable name.
        key: String,
    },
}
