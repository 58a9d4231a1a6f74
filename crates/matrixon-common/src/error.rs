//! Error types for the Matrixon sliding sync proxy
//!
//! This module defines the error type shared by every crate in the sliding
//! sync workspace. Errors carry enough context to tell a caller contract
//! violation apart from a storage failure or a broken invariant.

use thiserror::Error;
use std::io;

/// Matrixon sliding sync error types
#[derive(Debug, Error)]
pub enum MatrixonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The storage collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Data that should be impossible given its source
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// A list or room subscription was used without being configured first
    #[error("Not requested: {0}")]
    NotRequested(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Bad request error
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for Matrixon sliding sync operations
pub type Result<T> = std::result::Result<T, MatrixonError>;

impl MatrixonError {
    /// Whether this error means the caller asked for something it never configured
    pub fn is_not_requested(&self) -> bool {
        matches!(self, MatrixonError::NotRequested(_))
    }
}

impl From<serde_json::Error> for MatrixonError {
    fn from(err: serde_json::Error) -> Self {
        MatrixonError::Serialization(err.to_string())
    }
}

impl From<figment::Error> for MatrixonError {
    fn from(err: figment::Error) -> Self {
        MatrixonError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_error_display() {
        let err = MatrixonError::Config("test".to_string());
        assert_eq!(err.to_string(), "Configuration error: test");

        let err = MatrixonError::Storage("test".to_string());
        assert_eq!(err.to_string(), "Storage error: test");

        let err = MatrixonError::Invariant("test".to_string());
        assert_eq!(err.to_string(), "Invariant violated: test");

        let err = MatrixonError::NotRequested("test".to_string());
        assert_eq!(err.to_string(), "Not requested: test");

        let err = MatrixonError::InvalidState("test".to_string());
        assert_eq!(err.to_string(), "Invalid state: test");

        let err = MatrixonError::BadRequest("test".to_string());
        assert_eq!(err.to_string(), "Bad request: test");
    }

    #[test]
    fn test_not_requested_is_distinct() {
        assert!(MatrixonError::NotRequested("list a".into()).is_not_requested());
        assert!(!MatrixonError::BadRequest("list a".into()).is_not_requested());
    }

    #[test]
    fn test_error_conversion_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let err: MatrixonError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_conversion_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: MatrixonError = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }
}
