//! Error types for Tollgate
//!
//! All foundation and core errors are funneled through one enum. Public
//! cache and ledger entry points log these and degrade instead of returning
//! them; they surface mainly from storage and config helpers.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Tollgate error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that mean "the thing is simply not there yet"
    ///
    /// Callers treat these as an empty starting state rather than a fault.
    pub fn is_absent(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// True for errors caused by unreadable persisted content
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Json(_) | Error::Codec(_))
    }

    /// Storage error helper with path context
    pub fn storage(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Error::Storage(format!("{}: {}", path.display(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_classification() {
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io.is_absent());
        assert!(Error::NotFound("ledger".into()).is_absent());
        assert!(!Error::Config("bad".into()).is_absent());
    }

    #[test]
    fn test_corrupt_classification() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(Error::from(json_err).is_corrupt());
        assert!(Error::Codec("bad gzip".into()).is_corrupt());
        assert!(!Error::Internal("x".into()).is_corrupt());
    }
}
