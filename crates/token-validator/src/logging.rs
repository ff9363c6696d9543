//! Logging initialization
//!
//! The crate only emits `tracing` events. A host that already installed its own
//! subscriber keeps it; [`logger`] fills the gap for hosts that did not, installing
//! a stderr subscriber lazily and at most once per process.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use token_validator::logging::LoggingConfig;
//!
//! // Explicit setup at the composition root
//! LoggingConfig::structured("info").init()?;
//! # Ok::<(), token_validator::LoggingError>(())
//! ```
//!
//! [`logger`] returns the outcome of its one install attempt, not a handle.
//! Override it by installing your own subscriber first; see its docs.

use std::io;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::LoggingError;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `info`, `token_validator=debug`)
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
        }
    }
}

impl LoggingConfig {
    /// JSON output at the given level
    pub fn structured(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            structured: true,
        }
    }

    /// Build the filter, preferring `RUST_LOG` over the configured level
    ///
    /// # Errors
    ///
    /// Returns [`LoggingError::InvalidDirective`] if `level` does not parse.
    pub fn filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| LoggingError::InvalidDirective(e.to_string())),
        }
    }

    /// Install a stderr subscriber for this configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the level directive is invalid or a global
    /// subscriber has already been installed.
    pub fn init(&self) -> Result<(), LoggingError> {
        let subscriber = tracing_subscriber::registry().with(self.filter()?);

        if self.structured {
            subscriber
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
        } else {
            subscriber
                .with(fmt::layer().with_writer(io::stderr))
                .try_init()
                .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
        }
    }
}

static LOGGER: OnceLock<Result<(), LoggingError>> = OnceLock::new();

/// Install the default process-wide subscriber, at most once
///
/// The logger itself is the global `tracing` subscriber; this is not a handle
/// to it. The first call installs the default [`LoggingConfig`] and every call
/// returns the outcome of that one install attempt.
///
/// To override the logger, install your own subscriber before the first call
/// with `tracing::subscriber::set_global_default`; the install here then
/// reports [`LoggingError::AlreadyInitialized`] and yours stays in place. Tests
/// can instead scope a subscriber with `tracing::subscriber::set_default`,
/// which takes precedence on that thread whatever this function installed.
pub fn logger() -> &'static Result<(), LoggingError> {
    LOGGER.get_or_init(|| LoggingConfig::default().init())
}
