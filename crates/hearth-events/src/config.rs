//! Bus configuration.
//!
//! ```toml
//! # Bound on concurrently running async handlers, per event type.
//! max_concurrent_async = 32
//! default_severity = "debug"
//! log_snapshots = true
//!
//! [severity_overrides]
//! EntitySpawn = "trace"
//! ChatMessage = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::severity::Severity;

/// Settings applied to every event type's collection when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Per-event-type bound on concurrently running async handlers.
    /// `None` leaves them unbounded.
    pub max_concurrent_async: Option<usize>,
    /// Severity for event types that declare none.
    pub default_severity: Severity,
    /// Event display name → severity, overriding the declared one.
    pub severity_overrides: HashMap<String, Severity>,
    /// Include a JSON snapshot of the event in raise records.
    pub log_snapshots: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_concurrent_async: None,
            default_severity: Severity::Debug,
            severity_overrides: HashMap::new(),
            log_snapshots: true,
        }
    }
}

impl BusConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] for malformed TOML or unknown keys,
    /// and [`ConfigError::ValidationError`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        Self::parse(source, "<inline>")
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file cannot be read, and the
    /// errors of [`BusConfig::from_toml_str`] otherwise.
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::parse(&source, &path.display().to_string())?;
        debug!(path = %path.display(), "loaded bus config");
        Ok(config)
    }

    fn parse(source: &str, path: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::ParseError {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        match self.max_concurrent_async {
            Some(0) => {
                return Err(ConfigError::ValidationError {
                    field: "max_concurrent_async".to_owned(),
                    message: "must be at least 1; omit it to leave async handlers unbounded"
                        .to_owned(),
                });
            },
            Some(limit) if limit > Semaphore::MAX_PERMITS => {
                return Err(ConfigError::ValidationError {
                    field: "max_concurrent_async".to_owned(),
                    message: format!("must be at most {}", Semaphore::MAX_PERMITS),
                });
            },
            _ => {},
        }

        if self.severity_overrides.keys().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::ValidationError {
                field: "severity_overrides".to_owned(),
                message: "event names must not be empty".to_owned(),
            });
        }

        Ok(())
    }

    /// Bound concurrently running async handlers per event type.
    #[must_use]
    pub fn with_max_concurrent_async(mut self, limit: usize) -> Self {
        self.max_concurrent_async = Some(limit);
        self
    }

    /// Set the fallback severity.
    #[must_use]
    pub fn with_default_severity(mut self, severity: Severity) -> Self {
        self.default_severity = severity;
        self
    }

    /// Override the severity of one event type by display name.
    #[must_use]
    pub fn with_severity_override(mut self, event: impl Into<String>, severity: Severity) -> Self {
        self.severity_overrides.insert(event.into(), severity);
        self
    }

    /// Leave event snapshots out of raise records.
    #[must_use]
    pub fn without_snapshots(mut self) -> Self {
        self.log_snapshots = false;
        self
    }

    /// Severity for an event: override, then declared, then default.
    pub(crate) fn severity_for(&self, event: &str, declared: Option<Severity>) -> Severity {
        self.severity_overrides
            .get(event)
            .copied()
            .or(declared)
            .unwrap_or(self.default_severity)
    }
}
