//! Shared error and result types

use thiserror::Error;

/// Error types for the study data layer
#[derive(Debug, Error)]
pub enum StudyError {
    /// Malformed verse identifier or missing required parameter.
    /// Detected before any I/O, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A lookup stage (version/book/chapter/verse/entity) returned no row.
    /// Expected at the gateway layer but typed for callers.
    #[error("{0}")]
    NotFound(String),

    /// Network or remote-function failure, including application-level
    /// error envelopes in otherwise successful responses.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local durable-store open or transaction failure.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Unexpected internal state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StudyError {
    /// True for errors the UI renders inline per section rather than
    /// as a transient notification.
    pub fn is_expected(&self) -> bool {
        matches!(self, StudyError::Validation(_) | StudyError::NotFound(_))
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, StudyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StudyError::Validation("bad id".into());
        assert_eq!(err.to_string(), "Validation error: bad id");

        let err = StudyError::NotFound("Book 'Genesis' not found.".into());
        assert_eq!(err.to_string(), "Book 'Genesis' not found.");
    }

    #[test]
    fn test_expected_classification() {
        assert!(StudyError::Validation("x".into()).is_expected());
        assert!(StudyError::NotFound("x".into()).is_expected());
        assert!(!StudyError::Transport("x".into()).is_expected());
        assert!(!StudyError::Persistence("x".into()).is_expected());
    }
}
