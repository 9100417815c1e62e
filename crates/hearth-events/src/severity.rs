//! Log severity for raise and cancellation records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity at which an event type's dispatch is logged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Very chatty, per-tick events.
    Trace,
    /// The default for events that declare nothing.
    #[default]
    Debug,
    /// Noteworthy occurrences.
    Info,
    /// Occurrences an operator should look at.
    Warn,
    /// Occurrences that indicate something broke.
    Error,
}

impl From<Severity> for tracing::Level {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Trace => Self::TRACE,
            Severity::Debug => Self::DEBUG,
            Severity::Info => Self::INFO,
            Severity::Warn => Self::WARN,
            Severity::Error => Self::ERROR,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Emit a `tracing` event at a severity chosen at runtime.
macro_rules! log_at {
    ($severity:expr, $($arg:tt)+) => {
        match $severity {
            $crate::Severity::Trace => ::tracing::trace!($($arg)+),
            $crate::Severity::Debug => ::tracing::debug!($($arg)+),
            $crate::Severity::Info => ::tracing::info!($($arg)+),
            $crate::Severity::Warn => ::tracing::warn!($($arg)+),
            $crate::Severity::Error => ::tracing::error!($($arg)+),
        }
    };
}

pub(crate) use log_at;
