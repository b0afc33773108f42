//! Error types for agentops-core

use thiserror::Error;

/// Result type for agentops-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for agentops-core
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Record not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Record already exists
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// Invalid config type
    #[error("Invalid config_type: {0}")]
    InvalidConfigType(String),

    /// Invalid feedback type
    #[error("Invalid feedback_type: {0}")]
    InvalidFeedbackType(String),

    /// Caller supplied an unusable value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse error classification used at the outer boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input rejected; never retried
    Validation,
    /// Lookup by id or code yielded nothing
    NotFound,
    /// Store, serialization or environment failure
    Upstream,
}

impl Error {
    /// Shorthand for a not-found error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Classify this error into the client/server taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. }
            | Error::InvalidConfigType(_)
            | Error::InvalidFeedbackType(_)
            | Error::Validation(_) => ErrorKind::Validation,
            Error::Database(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Migration(_)
            | Error::Other(_) => ErrorKind::Upstream,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::not_found("Agent", "a-1").kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::InvalidConfigType("foo".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::Migration("boom".into()).kind(), ErrorKind::Upstream);
        assert_eq!(Error::from("boom").kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::not_found("Document", "doc-1").to_string(),
            "Document not found: doc-1"
        );
        assert_eq!(
            Error::InvalidConfigType("foo".into()).to_string(),
            "Invalid config_type: foo"
        );
    }
}
