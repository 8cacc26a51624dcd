//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// A required environment variable was not set.
    #[error("missing required environment variable: {name}")]
    MissingEnvVar { name: &'static str },

    /// Confidence threshold outside (0, 100].
    #[error("min confidence {value} must be greater than 0 and at most 100")]
    ConfidenceOutOfRange { value: f64 },

    /// Rate limiter settings must be positive.
    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },

    /// The sqlite backend was selected without a database path.
    #[error("cache backend 'sqlite' requires NUTRIMATCH_CACHE_PATH")]
    MissingCachePath,

    /// Path exists but is a directory where a file was expected.
    #[error("path is not a file: {path}")]
    NotAFile { path: PathBuf },
}
