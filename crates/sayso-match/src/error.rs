//! Error type for the matching subsystem.

use thiserror::Error;

/// Errors from fingerprint index handling and intent matching.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The fingerprint index is missing, empty, or unreadable. Matching
    /// cannot proceed and the caller must rebuild the index.
    #[error("Matcher unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = MatchError::Unavailable("index not found".to_string());
        assert_eq!(err.to_string(), "Matcher unavailable: index not found");

        let err = MatchError::Embedding("model gone".to_string());
        assert_eq!(err.to_string(), "Embedding failed: model gone");
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MatchError = io_err.into();
        assert!(matches!(err, MatchError::Io(_)));
    }
}
