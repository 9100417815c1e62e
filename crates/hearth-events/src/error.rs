//! Error types for the event bus.

use std::io;
use thiserror::Error;

/// Errors surfaced to callers of the bus.
///
/// Handler faults have no variant here: they are logged at the dispatch
/// site and never returned to the publisher.
#[derive(Debug, Error)]
pub enum EventError {
    /// A caller-supplied argument was rejected.
    #[error("Invalid argument '{argument}': {message}")]
    InvalidArgument {
        /// Name of the offending argument.
        argument: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// The same handler instance is already registered for this event type.
    #[error("Handler '{handler}' is already registered for event '{event}'")]
    AlreadyRegistered {
        /// Display name of the handler.
        handler: String,
        /// Display name of the event type.
        event: &'static str,
    },

    /// Asynchronous handlers exist but no Tokio runtime is available to run them.
    #[error("Cannot raise '{event}': asynchronous handlers require a Tokio runtime")]
    NoRuntime {
        /// Display name of the event type.
        event: &'static str,
    },

    /// Bus configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for bus operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors raised while loading or validating [`BusConfig`](crate::BusConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML.
    #[error("Failed to parse config file at {path}: {source}")]
    ParseError {
        /// Path (or `<inline>`) that failed to parse.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A parsed value is out of range.
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// Field that failed validation.
        field: String,
        /// Failure description.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
