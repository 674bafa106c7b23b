pub mod client;
pub mod queries;

pub use client::{GitHubClient, GraphQl, PrDiffs, RetryPolicy, RetryingClient};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GitHub API rate limited: {0}")]
    RateLimited(String),

    #[error("GraphQL rate limit exceeded after {0} attempts")]
    RetriesExhausted(u32),

    #[error("GraphQL errors: {0}")]
    Api(String),

    #[error("Failed to decode GitHub response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("GitHub token not found in config, GITHUB_TOKEN or GH_TOKEN")]
    MissingToken,
}

impl GitHubError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GitHubError::RateLimited(_))
    }

    /// Errors that abort the run instead of dropping one batch: exhausted
    /// rate-limit retries and rejected credentials.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GitHubError::RetriesExhausted(_)
                | GitHubError::MissingToken
                | GitHubError::Status { status: 401, .. }
        )
    }
}
