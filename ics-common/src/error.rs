//! Common error types for the information coordinator

use thiserror::Error;

/// Common result type for coordinator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the coordinator
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced type, producer, job or subscription does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request clashes with current registry state
    /// (type has active producers, job type change, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed input: non-absolute URI, missing field, schema mismatch
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unexpected registry inconsistency
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a `NotFound` with a formatted message
    pub fn not_found(what: &str, id: &str) -> Self {
        Error::NotFound(format!("{} not found: {}", what, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = Error::not_found("Information type", "weather");
        assert_eq!(err.to_string(), "Not found: Information type not found: weather");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
