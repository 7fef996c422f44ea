//! Error types for cvguard.

use thiserror::Error;

/// Main error type for cvguard operations.
///
/// A denied request is not an error; it is reported through
/// [`Verdict`](crate::ratelimit::Verdict). Only misuse surfaces here.
#[derive(Error, Debug)]
pub enum CvGuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A limit that would admit nothing or never expire
    #[error("Invalid rate limit: {0}")]
    InvalidLimit(String),

    /// An empty identifier or resource
    #[error("Invalid rate limit key: {0}")]
    InvalidKey(String),

    /// Errors raised while assembling layered configuration
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cvguard operations.
pub type Result<T> = std::result::Result<T, CvGuardError>;
