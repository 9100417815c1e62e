//! Hearth Telemetry - Logging for the Hearth event bus.
//!
//! This crate provides:
//! - Configurable subscriber setup with multiple formats and targets
//! - [`Logger`], the component-scoped handle every bus operation is given
//!
//! # Example
//!
//! ```rust,no_run
//! use hearth_telemetry::{LogConfig, LogFormat, Logger, setup_logging};
//!
//! # fn main() -> Result<(), hearth_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("hearth_events=debug");
//!
//! setup_logging(&config)?;
//!
//! let logger = Logger::new("spawn-protection");
//! logger.in_scope(|| tracing::info!("plugin loaded"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logger;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logger::Logger;
pub use logging::{
    FileLogConfig, FileRotation, LOG_ENV_VAR, LogConfig, LogFormat, LogTarget,
    setup_default_logging, setup_logging,
};
