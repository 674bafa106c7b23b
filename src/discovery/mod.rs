//! PR discovery and classification.
//!
//! Stages run in a fixed order and hand results forward through explicit
//! values: the [`AuthoredMap`] (key → role) and the reviewed key set.
//!
//! 1. local commits → PR keys ([`commits`])
//! 2. remote authored search, confirmed by in-window commits ([`fallback`])
//! 3. review/comment search, reviewed → contributed cross-check ([`reviews`])
//! 4. detail enrichment, authored/contributed decision, waiting PRs ([`enrich`])

pub mod commits;
pub mod enrich;
pub mod fallback;
pub mod reviews;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{info, instrument, warn};

use crate::git::{LocalGit, RepoInfo};
use crate::github::queries::{
    build_commit_check_query, parse_commit_check_response, COMMIT_CHECK_BATCH,
};
use crate::github::{GitHubError, GraphQl};
use crate::pr::{AuthoredEntry, PrKey, ReviewedEntry, Role, WaitingEntry};
use crate::window::DateWindow;

/// PRs the user authored or contributed to, with the PR author recorded
/// during commit→PR mapping when one was returned.
#[derive(Debug, Default)]
pub struct AuthoredMap {
    roles: BTreeMap<PrKey, Role>,
    known_authors: HashMap<PrKey, String>,
}

impl AuthoredMap {
    pub fn contains(&self, key: &PrKey) -> bool {
        self.roles.contains_key(key)
    }

    /// Insert unless already present. A key's first classification wins.
    pub fn insert_new(&mut self, key: PrKey, role: Role) -> bool {
        if self.roles.contains_key(&key) {
            return false;
        }
        self.roles.insert(key, role);
        true
    }

    pub fn set_role(&mut self, key: PrKey, role: Role) {
        self.roles.insert(key, role);
    }

    pub fn role(&self, key: &PrKey) -> Option<Role> {
        self.roles.get(key).copied()
    }

    pub fn record_author(&mut self, key: PrKey, login: &str) {
        if !login.is_empty() {
            self.known_authors.insert(key, login.to_string());
        }
    }

    pub fn known_author(&self, key: &PrKey) -> Option<&str> {
        self.known_authors.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PrKey> {
        self.roles.keys()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Everything discovered for one window, ready for content preparation.
#[derive(Debug, Default)]
pub struct Findings {
    /// Sorted by (repository, number).
    pub authored: Vec<AuthoredEntry>,
    /// Sorted by key.
    pub reviewed: Vec<ReviewedEntry>,
    pub waiting: Vec<WaitingEntry>,
}

/// Inputs shared by every stage.
pub struct Discovery<'a> {
    pub github: &'a dyn GraphQl,
    pub user: &'a str,
    /// `None` searches every organization.
    pub org: Option<&'a str>,
    pub window: DateWindow,
    pub excluded_bots: &'a [String],
    /// Request PR bodies and changed files during enrichment.
    pub with_bodies: bool,
}

impl<'a> Discovery<'a> {
    /// Run all stages. `authors` are the identities matched in local history
    /// (username first, then email aliases). With no local repos the run is
    /// remote-only.
    #[instrument(skip_all, fields(user = %self.user, window = %self.window))]
    pub async fn run(
        &self,
        git: &dyn LocalGit,
        repos: &[RepoInfo],
        authors: &[String],
    ) -> Result<Findings, GitHubError> {
        let mut authored = AuthoredMap::default();

        if !repos.is_empty() {
            commits::discover_local(self, git, repos, authors, &mut authored).await?;
        }
        fallback::search_authored(self, &mut authored).await?;
        info!(authored = authored.len(), "authored discovery complete");

        let reviewed = reviews::discover_reviews(self, &mut authored).await?;
        info!(reviewed = reviewed.len(), "review discovery complete");

        let findings = enrich::enrich(self, &mut authored, &reviewed).await?;
        info!(
            authored = findings.authored.len(),
            reviewed = findings.reviewed.len(),
            waiting = findings.waiting.len(),
            "enrichment complete"
        );
        Ok(findings)
    }

    /// Keys (checked in batches) where the user has an authored or committed
    /// commit dated inside the window.
    async fn confirm_commits(&self, keys: &[PrKey], stage: &str) -> Result<BTreeSet<PrKey>, GitHubError> {
        let mut confirmed = BTreeSet::new();
        for (batch_index, batch) in keys.chunks(COMMIT_CHECK_BATCH).enumerate() {
            let Some(query) = build_commit_check_query(batch) else {
                continue;
            };
            match self.github.query(&query, None).await {
                Ok(data) => confirmed.extend(parse_commit_check_response(
                    &data,
                    batch,
                    self.user,
                    &self.window,
                )),
                Err(e) => tolerate(e, stage, batch_index)?,
            }
        }
        Ok(confirmed)
    }
}

/// Drop a failed unit with a warning unless the error must abort the run.
fn tolerate(err: GitHubError, stage: &str, batch: usize) -> Result<(), GitHubError> {
    if err.is_fatal() {
        return Err(err);
    }
    warn!(stage, batch, error = %err, "query failed, continuing without it");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::git::tests::{commit, FakeGit};
    use crate::github::client::tests::FakeGraphQl;
    use crate::pr::Status;
    use crate::window::parse_date;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    pub fn window(from: &str, to: &str) -> DateWindow {
        DateWindow::new(parse_date(from).unwrap(), parse_date(to).unwrap()).unwrap()
    }

    pub fn discovery<'a>(github: &'a FakeGraphQl, bots: &'a [String], w: DateWindow) -> Discovery<'a> {
        Discovery {
            github,
            user: "alice",
            org: Some("dashpay"),
            window: w,
            excluded_bots: bots,
            with_bodies: false,
        }
    }

    pub fn detail(title: &str, state: &str, author: &str) -> Value {
        json!({"pullRequest": {
            "number": 1, "title": title, "state": state, "isDraft": false,
            "mergedAt": null, "additions": 10, "deletions": 3,
            "author": {"login": author}
        }})
    }

    #[test]
    fn test_authored_map_first_classification_wins() {
        let mut map = AuthoredMap::default();
        let key = PrKey::new("o", "r", 1);
        assert!(map.insert_new(key.clone(), Role::Authored));
        assert!(!map.insert_new(key.clone(), Role::Contributed));
        assert_eq!(map.role(&key), Some(Role::Authored));
        map.set_role(key.clone(), Role::Contributed);
        assert_eq!(map.role(&key), Some(Role::Contributed));
        map.record_author(key.clone(), "");
        assert!(map.known_author(&key).is_none());
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_commit_check() {
        let github = FakeGraphQl::new(vec![Err(GitHubError::RetriesExhausted(3))]);
        let bots: Vec<String> = Vec::new();
        let d = discovery(&github, &bots, window("2026-02-09", "2026-02-09"));
        let result = d.confirm_commits(&[PrKey::new("o", "r", 1)], "test").await;
        assert!(matches!(result, Err(GitHubError::RetriesExhausted(3))));
    }

    #[tokio::test]
    async fn test_squash_commit_reaches_authored_list() {
        let repo_path = PathBuf::from("/src/platform");
        let mut git = FakeGit::default();
        git.commits.insert(
            (repo_path.clone(), "alice".to_string()),
            vec![commit("abc", "Fix parser bug (#42)", "2026-02-09T14:00:00+01:00")],
        );
        let repos = vec![RepoInfo {
            path: repo_path,
            org: "dashpay".into(),
            name: "platform".into(),
        }];

        // authored search, review search, details, waiting
        let github = FakeGraphQl::new(vec![
            Ok(json!({"created": {"nodes": []}, "updated": {"nodes": []}})),
            Ok(json!({"reviewed": {"nodes": []}, "commented": {"nodes": []}})),
            Ok(json!({"pr_0": detail("Fix parser bug", "MERGED", "alice")})),
            Ok(json!({"search": {"nodes": []}})),
        ]);
        let bots: Vec<String> = Vec::new();
        let d = discovery(&github, &bots, window("2026-02-09", "2026-02-09"));
        let findings = d.run(&git, &repos, &["alice".to_string()]).await.unwrap();

        assert_eq!(findings.authored.len(), 1);
        let entry = &findings.authored[0];
        assert_eq!(entry.key, PrKey::new("dashpay", "platform", 42));
        assert!(!entry.contributed);
        assert_eq!(entry.status, Status::Merged);
        assert_eq!((entry.additions, entry.deletions), (0, 0));
        assert!(findings.reviewed.is_empty());
        assert_eq!(github.calls(), 4);
    }

    #[tokio::test]
    async fn test_other_author_becomes_contributed() {
        let repo_path = PathBuf::from("/src/platform");
        let mut git = FakeGit::default();
        git.commits.insert(
            (repo_path.clone(), "alice".to_string()),
            vec![commit("abc", "Fix parser bug (#42)", "2026-02-09T10:00:00Z")],
        );
        let repos = vec![RepoInfo {
            path: repo_path,
            org: "dashpay".into(),
            name: "platform".into(),
        }];
        let github = FakeGraphQl::new(vec![
            Ok(json!({})),
            Ok(json!({})),
            Ok(json!({"pr_0": detail("Fix parser bug", "OPEN", "bob")})),
            Ok(json!({})),
        ]);
        let bots: Vec<String> = Vec::new();
        let d = discovery(&github, &bots, window("2026-02-09", "2026-02-09"));
        let findings = d.run(&git, &repos, &["alice".to_string()]).await.unwrap();

        let entry = &findings.authored[0];
        assert!(entry.contributed);
        assert_eq!(entry.original_author.as_deref(), Some("bob"));
        assert_eq!((entry.additions, entry.deletions), (10, 3));
    }
}
