pub mod types;

pub use types::{AuthoredEntry, PrDetail, PrKey, ReviewedEntry, Role, Status, WaitingEntry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrError {
    #[error("Invalid repository '{0}', expected owner/name")]
    InvalidRepo(String),

    #[error("Invalid PR URL: {0}")]
    InvalidUrl(String),
}

/// Split an `owner/name` repository slug.
pub fn parse_repo_slug(slug: &str) -> Result<(String, String), PrError> {
    let mut parts = slug.trim().split('/').filter(|s| !s.is_empty());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) => Ok((owner.to_string(), name.to_string())),
        _ => Err(PrError::InvalidRepo(slug.to_string())),
    }
}

/// Parse a GitHub PR URL (`https://github.com/{owner}/{repo}/pull/{number}`)
/// into a key.
pub fn parse_pr_url(url: &str) -> Result<PrKey, PrError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| PrError::InvalidUrl(url.to_string()))?;

    if parsed.host_str() != Some("github.com") {
        return Err(PrError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| PrError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(PrError::InvalidUrl(url.to_string()));
    }

    let number = segments[3]
        .parse::<u64>()
        .map_err(|_| PrError::InvalidUrl(url.to_string()))?;

    Ok(PrKey::new(segments[0], segments[1], number))
}

/// Web link for a PR in `owner/name`.
pub fn pr_link(slug: &str, number: u64) -> String {
    format!("https://github.com/{}/pull/{}", slug, number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_pr_url() {
        let key = parse_pr_url("https://github.com/org/repo/pull/42").unwrap();
        assert_eq!(key, PrKey::new("org", "repo", 42));
    }

    #[test]
    fn test_parse_invalid_pr_url() {
        assert!(parse_pr_url("https://example.com").is_err());
        assert!(parse_pr_url("not-a-url").is_err());
        assert!(parse_pr_url("https://github.com/org/repo/pulls/42").is_err());
    }

    #[test]
    fn test_parse_repo_slug() {
        assert_eq!(
            parse_repo_slug("octocat/hello-world").unwrap(),
            ("octocat".to_string(), "hello-world".to_string())
        );
        assert!(parse_repo_slug("octocat").is_err());
        assert!(parse_repo_slug("a/b/c").is_err());
    }

    #[test]
    fn test_pr_link() {
        assert_eq!(pr_link("org/repo", 7), "https://github.com/org/repo/pull/7");
    }
}
