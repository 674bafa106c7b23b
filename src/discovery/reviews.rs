use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use super::{AuthoredMap, Discovery};
use crate::github::queries::{build_review_search_query, parse_search_nodes, Login, SearchNode};
use crate::github::GitHubError;
use crate::pr::{PrKey, Role};
use crate::window::DateWindow;

/// True when `user` submitted a review or created a comment on the PR inside
/// the window. The PR's own update time is irrelevant.
pub fn has_review_in_range(node: &SearchNode, user: &str, window: &DateWindow) -> bool {
    let by_user = |author: &Option<Login>| {
        author.as_ref().is_some_and(|a| a.login == user)
    };

    let reviewed = node.reviews.iter().flat_map(|c| c.iter()).any(|review| {
        by_user(&review.author)
            && review
                .submitted_at
                .as_deref()
                .is_some_and(|ts| window.contains_timestamp(ts))
    });
    if reviewed {
        return true;
    }

    node.comments.iter().flat_map(|c| c.iter()).any(|comment| {
        by_user(&comment.author)
            && comment
                .created_at
                .as_deref()
                .is_some_and(|ts| window.contains_timestamp(ts))
    })
}

/// PRs the user reviewed or commented on in the window and did not author.
///
/// Candidates whose commit history shows an in-window commit by the user
/// move to the authored map as [`Role::Contributed`] and leave the set.
#[instrument(skip_all)]
pub async fn discover_reviews(
    discovery: &Discovery<'_>,
    authored: &mut AuthoredMap,
) -> Result<BTreeSet<PrKey>, GitHubError> {
    let (query, variables) =
        build_review_search_query(discovery.org, discovery.user, &discovery.window);
    let data = match discovery.github.query(&query, Some(&variables)).await {
        Ok(data) => data,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(error = %e, "review discovery failed");
            return Ok(BTreeSet::new());
        }
    };

    let mut reviewed = BTreeSet::new();
    for alias in ["reviewed", "commented"] {
        for node in parse_search_nodes(&data, alias) {
            let Some(key) = node.key() else {
                continue;
            };
            if authored.contains(&key) {
                continue;
            }
            if has_review_in_range(&node, discovery.user, &discovery.window) {
                reviewed.insert(key);
            }
        }
    }
    debug!(candidates = reviewed.len(), "reviewed in window");

    let candidates: Vec<PrKey> = reviewed.iter().cloned().collect();
    for key in discovery.confirm_commits(&candidates, "contribution check").await? {
        reviewed.remove(&key);
        authored.set_role(key, Role::Contributed);
    }
    Ok(reviewed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::tests::{discovery, window};
    use crate::github::client::tests::FakeGraphQl;
    use serde_json::{json, Value};

    fn reviewed_node(number: u64, reviewer: &str, submitted: &str) -> Value {
        json!({
            "number": number,
            "title": "t",
            "updatedAt": "2026-02-09T12:00:00Z",
            "repository": {"name": "platform", "owner": {"login": "dashpay"}},
            "reviews": {"nodes": [{"author": {"login": reviewer}, "submittedAt": submitted, "state": "APPROVED"}]}
        })
    }

    fn commented_node(number: u64, commenter: &str, created: &str) -> Value {
        json!({
            "number": number,
            "repository": {"name": "platform", "owner": {"login": "dashpay"}},
            "comments": {"nodes": [{"author": {"login": commenter}, "createdAt": created}]}
        })
    }

    #[test]
    fn test_review_timestamp_not_update_timestamp_counts() {
        let w = window("2026-02-09", "2026-02-09");
        let old: SearchNode =
            serde_json::from_value(reviewed_node(1, "alice", "2026-01-20T10:00:00Z")).unwrap();
        assert!(!has_review_in_range(&old, "alice", &w));
        let fresh: SearchNode =
            serde_json::from_value(reviewed_node(1, "alice", "2026-02-09T10:00:00Z")).unwrap();
        assert!(has_review_in_range(&fresh, "alice", &w));
        let other: SearchNode =
            serde_json::from_value(reviewed_node(1, "bob", "2026-02-09T10:00:00Z")).unwrap();
        assert!(!has_review_in_range(&other, "alice", &w));
        let comment: SearchNode =
            serde_json::from_value(commented_node(1, "alice", "2026-02-09T23:00:00Z")).unwrap();
        assert!(has_review_in_range(&comment, "alice", &w));
    }

    #[tokio::test]
    async fn test_authored_keys_are_not_reviewed() {
        let github = FakeGraphQl::new(vec![
            Ok(json!({
                "reviewed": {"nodes": [
                    reviewed_node(1, "alice", "2026-02-09T10:00:00Z"),
                    reviewed_node(2, "alice", "2026-02-09T10:00:00Z")
                ]},
                "commented": {"nodes": [commented_node(3, "alice", "2026-02-01T10:00:00Z")]}
            })),
            Ok(json!({})),
        ]);
        let bots: Vec<String> = Vec::new();
        let d = discovery(&github, &bots, window("2026-02-09", "2026-02-09"));
        let mut authored = AuthoredMap::default();
        authored.insert_new(PrKey::new("dashpay", "platform", 1), Role::Authored);

        let reviewed = discover_reviews(&d, &mut authored).await.unwrap();
        let numbers: Vec<_> = reviewed.iter().map(|k| k.number).collect();
        assert_eq!(numbers, vec![2]);
        assert_eq!(authored.role(&PrKey::new("dashpay", "platform", 1)), Some(Role::Authored));
    }

    #[tokio::test]
    async fn test_reviewed_with_commit_moves_to_contributed() {
        let github = FakeGraphQl::new(vec![
            Ok(json!({
                "reviewed": {"nodes": [
                    reviewed_node(4, "alice", "2026-02-09T10:00:00Z"),
                    reviewed_node(5, "alice", "2026-02-09T10:00:00Z")
                ]},
                "commented": {"nodes": []}
            })),
            Ok(json!({"pr_0": {"pullRequest": {"commits": {"nodes": [{"commit": {
                "author": {"user": {"login": "alice"}, "date": "2026-02-09T08:00:00Z"},
                "committer": null
            }}]}}}})),
        ]);
        let bots: Vec<String> = Vec::new();
        let d = discovery(&github, &bots, window("2026-02-09", "2026-02-09"));
        let mut authored = AuthoredMap::default();

        let reviewed = discover_reviews(&d, &mut authored).await.unwrap();
        let pr4 = PrKey::new("dashpay", "platform", 4);
        assert!(!reviewed.contains(&pr4));
        assert_eq!(reviewed.len(), 1);
        assert_eq!(authored.role(&pr4), Some(Role::Contributed));
    }
}
