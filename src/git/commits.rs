use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::LocalGit;
use crate::window::DateWindow;

/// Squash-merge convention: subject ends with `(#NNN)`.
static PR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(#(\d+)\)\s*$").unwrap());

/// A commit from the local history scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub sha: String,
    pub subject: String,
    pub author_email: String,
    /// ISO-8601 author timestamp.
    pub author_date: String,
}

/// Commits by any of `authors` whose own author date lies in `window`.
///
/// The history scan is widened by a day on each side; the exact window is
/// then applied to each commit's author date. Results are deduplicated by
/// hash across identities. A failing scan for one identity is logged and
/// contributes nothing.
pub async fn find_commits(
    git: &dyn LocalGit,
    repo: &Path,
    authors: &[String],
    window: &DateWindow,
) -> Vec<GitCommit> {
    let (after, before) = window.with_slack();
    let mut seen = HashSet::new();
    let mut commits = Vec::new();

    for author in authors {
        let raw = match git.log(repo, author, after, before).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(repo = %repo.display(), author = %author, error = %e, "git log failed");
                continue;
            }
        };
        for commit in raw {
            if seen.contains(&commit.sha) || !window.contains_timestamp(&commit.author_date) {
                continue;
            }
            seen.insert(commit.sha.clone());
            commits.push(commit);
        }
    }

    debug!(repo = %repo.display(), commits = commits.len(), "commits in window");
    commits
}

/// Split commits into those whose subject names a PR and the rest.
pub fn extract_pr_numbers(commits: Vec<GitCommit>) -> (BTreeMap<u64, Vec<GitCommit>>, Vec<GitCommit>) {
    let mut mapped: BTreeMap<u64, Vec<GitCommit>> = BTreeMap::new();
    let mut unmapped = Vec::new();

    for commit in commits {
        let number = PR_SUFFIX
            .captures(&commit.subject)
            .and_then(|c| c[1].parse::<u64>().ok());
        match number {
            Some(number) => mapped.entry(number).or_default().push(commit),
            None => unmapped.push(commit),
        }
    }

    (mapped, unmapped)
}
