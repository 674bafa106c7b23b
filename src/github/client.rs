use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::GitHubError;
use crate::pr::PrKey;

const GRAPHQL_ENDPOINT: &str = "https://api.github.com/graphql";
const REST_ENDPOINT: &str = "https://api.github.com";
const USER_AGENT: &str = "daily-report";

/// The remote query facility: send a GraphQL document, get back the `data`
/// object of the response.
///
/// Implementations must report rate limiting as [`GitHubError::RateLimited`]
/// so [`RetryingClient`] can back off; every other error is final.
#[async_trait]
pub trait GraphQl: Send + Sync {
    async fn query(&self, query: &str, variables: Option<&Value>) -> Result<Value, GitHubError>;
}

/// Pull the `data` object out of a GraphQL response body.
///
/// A response whose errors are all `RATE_LIMITED` is retryable; any other
/// error list is fatal.
pub fn extract_data(response: Value) -> Result<Value, GitHubError> {
    let errors = response
        .get("errors")
        .and_then(Value::as_array)
        .filter(|errors| !errors.is_empty());

    if let Some(errors) = errors {
        let message_of = |err: &Value| {
            err.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string())
        };
        let rate_limited = errors
            .iter()
            .all(|err| err.get("type").and_then(Value::as_str) == Some("RATE_LIMITED"));
        if rate_limited {
            return Err(GitHubError::RateLimited(message_of(&errors[0])));
        }
        let messages: Vec<String> = errors.iter().map(message_of).collect();
        return Err(GitHubError::Api(messages.join("; ")));
    }

    Ok(response.get("data").cloned().unwrap_or_else(|| json!({})))
}

/// GitHub GraphQL + REST client authenticated with a bearer token.
pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
    graphql_endpoint: String,
    rest_endpoint: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            graphql_endpoint: GRAPHQL_ENDPOINT.to_string(),
            rest_endpoint: REST_ENDPOINT.to_string(),
        }
    }
}

/// Unified diff of a single PR.
#[async_trait]
pub trait PrDiffs: Send + Sync {
    async fn pr_diff(&self, key: &PrKey) -> Result<String, GitHubError>;
}

#[async_trait]
impl PrDiffs for GitHubClient {
    #[instrument(skip(self), fields(pr = %key))]
    async fn pr_diff(&self, key: &PrKey) -> Result<String, GitHubError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.rest_endpoint, key.org, key.repo, key.number
        );
        debug!("fetching PR diff from GitHub API");
        let diff_text = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github.diff")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(diff_bytes = diff_text.len(), "received PR diff");
        Ok(diff_text)
    }
}

#[async_trait]
impl GraphQl for GitHubClient {
    async fn query(&self, query: &str, variables: Option<&Value>) -> Result<Value, GitHubError> {
        let mut body = json!({ "query": query });
        if let Some(variables) = variables {
            body["variables"] = variables.clone();
        }

        let response = self
            .http
            .post(&self.graphql_endpoint)
            .header("User-Agent", USER_AGENT)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && text.to_lowercase().contains("rate limit"))
        {
            return Err(GitHubError::RateLimited(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(GitHubError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        debug!(response_bytes = text.len(), "received GraphQL response");
        extract_data(serde_json::from_str(&text)?)
    }
}

/// Bounded exponential backoff for rate-limited calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles on each later attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Decorator that retries rate-limited queries. Callers above it never see
/// a `RateLimited` error, only `RetriesExhausted` once attempts run out.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: GraphQl> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: GraphQl> GraphQl for RetryingClient<C> {
    async fn query(&self, query: &str, variables: Option<&Value>) -> Result<Value, GitHubError> {
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 0..max_attempts {
            match self.inner.query(query, variables).await {
                Err(err) if err.is_rate_limited() => {
                    if attempt + 1 == max_attempts {
                        break;
                    }
                    let wait = self.policy.base_delay * 2u32.pow(attempt);
                    warn!(attempt = attempt + 1, wait_ms = wait.as_millis() as u64, "rate limited, retrying");
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
        Err(GitHubError::RetriesExhausted(max_attempts))
    }
}

#[async_trait]
impl<C: GraphQl + PrDiffs> PrDiffs for RetryingClient<C> {
    async fn pr_diff(&self, key: &PrKey) -> Result<String, GitHubError> {
        self.inner.pr_diff(key).await
    }
}
