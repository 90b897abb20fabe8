//! The code-hosting provider: source of truth for usernames, repositories and commits.

mod github;

pub use github::GithubClient;

use thiserror::Error;

use crate::types::{UpstreamCommit, UpstreamRepository};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("token rejected by provider")]
    Unauthorized,

    #[error("network error: {0}")]
    Network(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Decode(String),
}

impl UpstreamError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Network(_) | UpstreamError::Timeout => true,
            UpstreamError::Status { status, .. } => *status >= 500,
            UpstreamError::Unauthorized | UpstreamError::Decode(_) => false,
        }
    }
}

/// Read-only view of the provider, authenticated per call with the caller's token.
pub trait UpstreamClient: Send + Sync {
    fn fetch_username(&self, token: &str) -> Result<String, UpstreamError>;
    fn fetch_repositories(&self, token: &str) -> Result<Vec<UpstreamRepository>, UpstreamError>;
    fn fetch_commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<UpstreamCommit>, UpstreamError>;
}
