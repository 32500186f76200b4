//! Tracing subscriber setup

use tracing_subscriber::{prelude::*, EnvFilter};

/// Default filter when neither a flag nor `RUST_LOG` is set
pub const DEFAULT_FILTER: &str = "info";

/// Logging setup failure
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The filter directive did not parse
    #[error("invalid log filter `{directive}`: {message}")]
    InvalidFilter {
        /// Rejected directive
        directive: String,
        /// Parser message
        message: String,
    },

    /// A global subscriber was already installed
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Build the filter: explicit level, then `RUST_LOG`, then [`DEFAULT_FILTER`]
///
/// # Errors
/// Returns [`LoggingError::InvalidFilter`] when `level` does not parse.
pub fn filter(level: Option<&str>) -> Result<EnvFilter, LoggingError> {
    match level {
        Some(directive) => EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidFilter {
            directive: directive.to_string(),
            message: e.to_string(),
        }),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber
///
/// # Errors
/// Fails on a bad filter or when a subscriber is already set.
pub fn init(level: Option<&str>, json: bool) -> Result<(), LoggingError> {
    let filter = filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
