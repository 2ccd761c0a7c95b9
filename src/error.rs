//! Error types for feedmill.

use thiserror::Error;

/// Common error type for feedmill.
#[derive(Error, Debug)]
pub enum FeedmillError {
    /// Fetch error.
    ///
    /// Network, HTTP status, size limit, parse and timeout failures raised by a
    /// crawler engine.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Storage error.
    ///
    /// Any persistence failure, including connectivity. Errors from sqlx are
    /// converted automatically.
    #[error("storage error: {0}")]
    Storage(String),

    /// Validation error for malformed input.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for FeedmillError {
    fn from(e: sqlx::Error) -> Self {
        FeedmillError::Storage(e.to_string())
    }
}

/// Result type alias for feedmill operations.
pub type Result<T> = std::result::Result<T, FeedmillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FeedmillError::Fetch("HTTP error: 404 Not Found".to_string());
        assert_eq!(err.to_string(), "fetch error: HTTP error: 404 Not Found");
    }

    #[test]
    fn test_storage_error_display() {
        let err = FeedmillError::Storage("database is locked".to_string());
        assert_eq!(err.to_string(), "storage error: database is locked");
    }

    #[test]
    fn test_validation_error_display() {
        let err = FeedmillError::Validation("blank title".to_string());
        assert_eq!(err.to_string(), "validation error: blank title");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FeedmillError = io_err.into();
        assert!(matches!(err, FeedmillError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let err: FeedmillError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, FeedmillError::Storage(_)));
    }
}
