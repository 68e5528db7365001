//! Helpers for reading configuration from the environment.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::ConfigError;

/// Read an optional environment variable.
///
/// Missing and empty variables both resolve to `None`.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode {
            key: key.to_string(),
        }),
    }
}

/// Read and parse an optional environment variable.
pub(crate) fn parsed_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    optional_env(key)?
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}
