//! Error types for gridsync.

use std::time::Duration;
use thiserror::Error;

/// Reconciliation errors.
///
/// All of these are handled inside the reconciler; none reach the screen's
/// render path as a failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The data source failed. Surfaced as an error flag, never retried.
    #[error("fetch failed: {0}")]
    FetchFailed(#[from] SourceError),

    /// A widget produced a value outside the filter's declared domain.
    #[error("invalid value {value:?} for filter '{key}': expected {expected}")]
    InvalidFilterValue {
        key: String,
        value: String,
        expected: String,
    },

    /// A response arrived for parameters that are no longer current.
    #[error("stale response for fetch #{ticket} discarded")]
    StaleResponse { ticket: u64 },
}

/// Data source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Transport-level failure (connect, TLS, invalid URL).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request did not complete in time.
    #[error("request timed out after {duration:?}")]
    Timeout { duration: Duration },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config directory found.
    #[error("Config directory not found")]
    NoConfigDir,

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}
