use thiserror::Error;

/// Top-level error type for the sayso system.
///
/// Subsystem crates define their own error types and convert into
/// `SaysoError` at crate boundaries so that the `?` operator works
/// seamlessly across the workspace.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SaysoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Matcher error: {0}")]
    Matcher(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for SaysoError {
    fn from(err: toml::de::Error) -> Self {
        SaysoError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SaysoError {
    fn from(err: toml::ser::Error) -> Self {
        SaysoError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SaysoError {
    fn from(err: serde_json::Error) -> Self {
        SaysoError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for sayso operations.
pub type Result<T> = std::result::Result<T, SaysoError>;
