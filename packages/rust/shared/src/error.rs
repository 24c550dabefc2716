//! Error types for leadscout.
//!
//! Library crates use [`LeadscoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all leadscout operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadscoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Request failure after all retries were exhausted.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed dataset line, cache payload, or API response.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Cache database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Enricher failure (lookup, crawl, or response handling).
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid caller input (non-positive limit, empty industry, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadscoutError>;

impl LeadscoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LeadscoutError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = LeadscoutError::validation("limit must be positive, got 0");
        assert!(err.to_string().contains("limit must be positive"));
    }
}
