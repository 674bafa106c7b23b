use tracing::{debug, instrument};

use super::{tolerate, AuthoredMap, Discovery};
use crate::git::{extract_pr_numbers, find_commits, LocalGit, RepoInfo};
use crate::github::queries::{build_commit_to_pr_query, parse_commit_to_pr_response, COMMIT_BATCH};
use crate::github::GitHubError;
use crate::pr::{PrKey, Role};

/// Map the user's in-window local commits to PR keys.
///
/// Subjects carrying a trailing `(#N)` map directly; the remaining commits
/// are resolved through the platform's commit→PR association in batches.
/// Every key found here starts out as [`Role::Authored`]; enrichment makes
/// the final authored/contributed call.
#[instrument(skip_all, fields(repos = repos.len()))]
pub async fn discover_local(
    discovery: &Discovery<'_>,
    git: &dyn LocalGit,
    repos: &[RepoInfo],
    authors: &[String],
    authored: &mut AuthoredMap,
) -> Result<(), GitHubError> {
    for repo in repos {
        let commits = find_commits(git, &repo.path, authors, &discovery.window).await;
        if commits.is_empty() {
            continue;
        }

        let (mapped, unmapped) = extract_pr_numbers(commits);
        debug!(
            repo = %repo.slug(),
            mapped = mapped.len(),
            unmapped = unmapped.len(),
            "extracted PR numbers from subjects"
        );
        for number in mapped.keys() {
            authored.insert_new(PrKey::new(&repo.org, &repo.name, *number), Role::Authored);
        }

        let shas: Vec<String> = unmapped.into_iter().map(|c| c.sha).collect();
        for (batch_index, batch) in shas.chunks(COMMIT_BATCH).enumerate() {
            let query = build_commit_to_pr_query(&repo.org, &repo.name, batch);
            let data = match discovery.github.query(&query, None).await {
                Ok(data) => data,
                Err(e) => {
                    tolerate(e, "commit mapping", batch_index)?;
                    continue;
                }
            };
            for prs in parse_commit_to_pr_response(&data).into_values() {
                for pr in prs.into_iter().filter(|pr| pr.number > 0) {
                    let key = PrKey::new(&repo.org, &repo.name, pr.number);
                    if authored.insert_new(key.clone(), Role::Authored) {
                        if let Some(author) = &pr.author {
                            authored.record_author(key, &author.login);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::tests::{discovery, window};
    use crate::git::tests::{commit, FakeGit};
    use crate::github::client::tests::FakeGraphQl;
    use serde_json::json;
    use std::path::PathBuf;

    fn platform() -> (PathBuf, Vec<RepoInfo>) {
        let path = PathBuf::from("/src/platform");
        let repos = vec![RepoInfo {
            path: path.clone(),
            org: "dashpay".into(),
            name: "platform".into(),
        }];
        (path, repos)
    }

    #[tokio::test]
    async fn test_unmapped_commits_resolved_remotely() {
        let (path, repos) = platform();
        let mut git = FakeGit::default();
        git.commits.insert(
            (path, "alice".to_string()),
            vec![
                commit("aaa", "Fix parser bug (#42)", "2026-02-09T10:00:00Z"),
                commit("bbb", "wip: tokenizer", "2026-02-09T11:00:00Z"),
            ],
        );
        let github = FakeGraphQl::new(vec![Ok(json!({"repository": {
            "c0": {"oid": "bbb", "associatedPullRequests": {"nodes": [
                {"number": 50, "title": "Tokenizer", "author": {"login": "bob"}},
                {"number": 42, "title": "Fix parser bug", "author": {"login": "carol"}}
            ]}}
        }}))]);
        let bots: Vec<String> = Vec::new();
        let d = discovery(&github, &bots, window("2026-02-09", "2026-02-09"));
        let mut authored = AuthoredMap::default();
        discover_local(&d, &git, &repos, &["alice".to_string()], &mut authored)
            .await
            .unwrap();

        let keys: Vec<_> = authored.keys().map(|k| k.number).collect();
        assert_eq!(keys, vec![42, 50]);
        let pr50 = PrKey::new("dashpay", "platform", 50);
        assert_eq!(authored.known_author(&pr50), Some("bob"));
        // #42 was already known from its subject, so its author is not overwritten
        assert!(authored.known_author(&PrKey::new("dashpay", "platform", 42)).is_none());
        assert!(github.query_at(0).contains("object(expression: \"bbb\")"));
    }

    #[tokio::test]
    async fn test_commit_mapping_batches_of_25() {
        let (path, repos) = platform();
        let mut git = FakeGit::default();
        let commits = (0..30)
            .map(|i| commit(&format!("sha{i}"), "no reference", "2026-02-09T10:00:00Z"))
            .collect();
        git.commits.insert((path, "alice".to_string()), commits);
        let github = FakeGraphQl::new(vec![
            Err(GitHubError::Api("Something went wrong".into())),
            Ok(json!({})),
        ]);
        let bots: Vec<String> = Vec::new();
        let d = discovery(&github, &bots, window("2026-02-09", "2026-02-09"));
        let mut authored = AuthoredMap::default();
        discover_local(&d, &git, &repos, &["alice".to_string()], &mut authored)
            .await
            .unwrap();

        assert_eq!(github.calls(), 2);
        assert!(github.query_at(1).contains("c4: object(expression: \"sha29\")"));
        assert!(authored.is_empty());
    }

    #[tokio::test]
    async fn test_repo_with_failing_log_is_skipped() {
        let (path, repos) = platform();
        let git = FakeGit {
            failing_logs: vec![path],
            ..Default::default()
        };
        let github = FakeGraphQl::default();
        let bots: Vec<String> = Vec::new();
        let d = discovery(&github, &bots, window("2026-02-09", "2026-02-09"));
        let mut authored = AuthoredMap::default();
        discover_local(&d, &git, &repos, &["alice".to_string()], &mut authored)
            .await
            .unwrap();
        assert!(authored.is_empty());
        assert_eq!(github.calls(), 0);
    }
}
