//! Error taxonomy for the dispatch pipeline.
//!
//! These are the terminal, caller-visible failures of a dispatch call.
//! Two outcomes deliberately do NOT appear here: a failed execution
//! (non-zero exit, callable fault) and a user abort are both normal
//! [`DispatchOutcome`](crate::types::DispatchOutcome) values.

use sayso_match::MatchError;
use thiserror::Error;

/// Errors terminating the current dispatch call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The action id is not in the whitelist at the moment of execution.
    #[error("Action not whitelisted: {0}")]
    NotWhitelisted(String),

    /// The whitelisted id does not resolve to an existing file or
    /// registered callable module.
    #[error("Action not found: {0}")]
    NotFound(String),

    /// The fingerprint index is missing or empty; matching cannot proceed.
    #[error("Matcher unavailable: {0}")]
    MatcherUnavailable(String),

    /// No entry point under either fixed name in the callable module.
    #[error("No callable entry point in {0}")]
    NoEntryPoint(String),

    /// A required parameter is unbound or an unknown name was supplied.
    #[error("Argument binding failed: {0}")]
    ArgumentBinding(String),

    /// The whitelist file is missing or unreadable where an
    /// empty-but-present file was expected. Never treated as an empty
    /// whitelist: that could be a corrupted security boundary.
    #[error("Whitelist missing or unreadable: {0}")]
    RegistryCorrupt(String),

    #[error("Audit log write failed: {0}")]
    Audit(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MatchError> for DispatchError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::Unavailable(detail) => DispatchError::MatcherUnavailable(detail),
            other => DispatchError::MatcherUnavailable(other.to_string()),
        }
    }
}
