use thiserror::Error;

use crate::upstream::UpstreamError;

/// One document that a bulk write failed to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("not provisioned: {0}")]
    NotProvisioned(String),

    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("search backend error during {operation}: {message}")]
    Backend { operation: String, message: String },

    #[error(
        "{count} of the writes to collection {collection} failed (first: {first})",
        count = .failures.len(),
        first = first_failure(.failures)
    )]
    PartialWrite {
        collection: String,
        failures: Vec<WriteFailure>,
    },

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("{service} request timed out")]
    Timeout { service: &'static str },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Upstream(e) => e.is_retryable(),
            _ => false,
        }
    }
}

fn first_failure(failures: &[WriteFailure]) -> String {
    failures
        .first()
        .map(|f| format!("{}: {}", f.id, f.reason))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_write_names_first_failed_document() {
        let err = Error::PartialWrite {
            collection: "repo-a".to_string(),
            failures: vec![
                WriteFailure {
                    id: "abc123".to_string(),
                    reason: "mapper_parsing_exception".to_string(),
                },
                WriteFailure {
                    id: "def456".to_string(),
                    reason: "mapper_parsing_exception".to_string(),
                },
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("2 of the writes to collection repo-a failed"));
        assert!(message.contains("abc123: mapper_parsing_exception"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(Error::Timeout { service: "search backend" }.is_retryable());
        assert!(Error::Upstream(UpstreamError::Timeout).is_retryable());
        assert!(!Error::Upstream(UpstreamError::Unauthorized).is_retryable());
        assert!(!Error::NotFound("repo".to_string()).is_retryable());
    }
}
