//! GraphQL query builders and response parsers.
//!
//! Batched queries use index-based aliases (`pr_0`, `c0`, ...) so responses
//! can be correlated with the request list without trusting any returned
//! identifier.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;
use serde_json::{json, Value};

use crate::pr::{parse_pr_url, PrDetail, PrKey};
use crate::window::DateWindow;

/// Max commits resolved per commit→PR query.
pub const COMMIT_BATCH: usize = 25;
/// Max PRs per commit-check query.
pub const COMMIT_CHECK_BATCH: usize = 15;
/// Max PRs per detail query.
pub const DETAIL_BATCH: usize = 20;

/// Escape a value interpolated into a GraphQL string literal.
pub fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn org_qualifier(org: Option<&str>) -> String {
    match org {
        Some(org) if !org.is_empty() => format!("org:{} ", org),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Login {
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: Option<Login>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<Option<T>>,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> Connection<T> {
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().flatten()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewNode {
    pub author: Option<Login>,
    pub submitted_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    pub author: Option<Login>,
    pub created_at: Option<String>,
}

/// A requested reviewer: a user (`login`) or a team (`slug`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestedReviewer {
    pub login: Option<String>,
    pub slug: Option<String>,
}

impl RequestedReviewer {
    pub fn handle(&self) -> Option<&str> {
        self.login
            .as_deref()
            .or(self.slug.as_deref())
            .filter(|h| !h.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequestNode {
    pub requested_reviewer: Option<RequestedReviewer>,
}

/// A PR node returned by a `search(type: ISSUE)` query. Only the fields the
/// particular query selected are populated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchNode {
    pub number: Option<u64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_draft: bool,
    pub url: Option<String>,
    pub created_at: Option<String>,
    pub author: Option<Login>,
    pub repository: Option<RepositoryRef>,
    #[serde(default)]
    pub reviews: Option<Connection<ReviewNode>>,
    #[serde(default)]
    pub comments: Option<Connection<CommentNode>>,
    #[serde(default)]
    pub review_requests: Option<Connection<ReviewRequestNode>>,
}

impl SearchNode {
    /// Key from the repository owner/name, falling back to the PR URL.
    pub fn key(&self) -> Option<PrKey> {
        let number = self.number.filter(|n| *n > 0)?;
        if let Some(repo) = &self.repository {
            let owner = repo.owner.as_ref().map(|o| o.login.as_str()).unwrap_or("");
            if !owner.is_empty() && !repo.name.is_empty() {
                return Some(PrKey::new(owner, repo.name.as_str(), number));
            }
        }
        self.url.as_deref().and_then(|url| parse_pr_url(url).ok())
    }
}

/// Nodes of the search result under `alias`. Null nodes and non-PR results
/// (empty objects) are dropped.
pub fn parse_search_nodes(data: &Value, alias: &str) -> Vec<SearchNode> {
    data.get(alias)
        .and_then(|search| search.get("nodes"))
        .and_then(Value::as_array)
        .map(|nodes| {
            nodes
                .iter()
                .filter(|node| !node.is_null())
                .filter_map(|node| serde_json::from_value::<SearchNode>(node.clone()).ok())
                .filter(|node| node.number.is_some())
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// viewer
// ---------------------------------------------------------------------------

pub const VIEWER_QUERY: &str = "{ viewer { login } }";

pub fn parse_viewer(data: &Value) -> Option<String> {
    data.pointer("/viewer/login")
        .and_then(Value::as_str)
        .filter(|login| !login.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// authored search (remote fallback)
// ---------------------------------------------------------------------------

const SEARCH_PR_FIELDS: &str = "\
      ... on PullRequest {
        number
        title
        state
        isDraft
        url
        updatedAt
        author { login }
        repository {
          name
          owner { login }
        }";

/// "Authored by user, created OR updated in the window" as two aliased
/// searches (`created`, `updated`).
pub fn build_authored_search_query(
    org: Option<&str>,
    user: &str,
    window: &DateWindow,
) -> (String, Value) {
    let query = format!(
        "query AuthoredSearch($createdQuery: String!, $updatedQuery: String!) {{
  created: search(query: $createdQuery, type: ISSUE, first: 100) {{
    nodes {{
{fields}
      }}
    }}
  }}
  updated: search(query: $updatedQuery, type: ISSUE, first: 100) {{
    nodes {{
{fields}
      }}
    }}
  }}
}}",
        fields = SEARCH_PR_FIELDS
    );
    let org = org_qualifier(org);
    let range = window.search_range();
    let variables = json!({
        "createdQuery": format!("{org}author:{user} created:{range} type:pr"),
        "updatedQuery": format!("{org}author:{user} updated:{range} type:pr"),
    });
    (query, variables)
}

// ---------------------------------------------------------------------------
// commit -> PR association
// ---------------------------------------------------------------------------

/// A PR associated with a commit on the hosting platform.
#[derive(Debug, Clone, Deserialize)]
pub struct AssociatedPr {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub author: Option<Login>,
}

/// Resolve up to [`COMMIT_BATCH`] commit hashes to their associated PRs.
/// Extra hashes beyond the batch size are ignored.
pub fn build_commit_to_pr_query(org: &str, repo: &str, shas: &[String]) -> String {
    let fragments: Vec<String> = shas
        .iter()
        .take(COMMIT_BATCH)
        .enumerate()
        .map(|(i, sha)| {
            format!(
                "    c{i}: object(expression: \"{sha}\") {{
      ... on Commit {{
        oid
        associatedPullRequests(first: 5) {{
          nodes {{
            number
            title
            author {{ login }}
          }}
        }}
      }}
    }}",
                sha = escape(sha)
            )
        })
        .collect();
    format!(
        "{{\n  repository(owner: \"{}\", name: \"{}\") {{\n{}\n  }}\n}}",
        escape(org),
        escape(repo),
        fragments.join("\n")
    )
}

/// Map commit hash → associated PRs.
pub fn parse_commit_to_pr_response(data: &Value) -> BTreeMap<String, Vec<AssociatedPr>> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct CommitObject {
        #[serde(default)]
        oid: String,
        #[serde(default)]
        associated_pull_requests: Connection<AssociatedPr>,
    }

    let mut result = BTreeMap::new();
    let Some(repo) = data.get("repository").and_then(Value::as_object) else {
        return result;
    };
    for (alias, object) in repo {
        if !alias.starts_with('c') || object.is_null() {
            continue;
        }
        let Ok(commit) = serde_json::from_value::<CommitObject>(object.clone()) else {
            continue;
        };
        if commit.oid.is_empty() {
            continue;
        }
        let prs = commit.associated_pull_requests.iter().cloned().collect();
        result.insert(commit.oid, prs);
    }
    result
}

// ---------------------------------------------------------------------------
// commit check
// ---------------------------------------------------------------------------

/// Fetch the commit list (author/committer login + date) of each PR.
/// Returns `None` for an empty batch.
pub fn build_commit_check_query(keys: &[PrKey]) -> Option<String> {
    if keys.is_empty() {
        return None;
    }
    let fragments: Vec<String> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            format!(
                "  pr_{i}: repository(owner: \"{org}\", name: \"{repo}\") {{
    pullRequest(number: {number}) {{
      number
      commits(first: 100) {{
        nodes {{
          commit {{
            author {{ user {{ login }} date }}
            committer {{ user {{ login }} date }}
          }}
        }}
      }}
    }}
  }}",
                org = escape(&key.org),
                repo = escape(&key.repo),
                number = key.number
            )
        })
        .collect();
    Some(format!("{{\n{}\n}}", fragments.join("\n")))
}

/// Keys whose commit list contains a commit where `user` is the author or
/// committer and that same field's date lies in the window.
pub fn parse_commit_check_response(
    data: &Value,
    keys: &[PrKey],
    user: &str,
    window: &DateWindow,
) -> BTreeSet<PrKey> {
    #[derive(Deserialize)]
    struct Actor {
        user: Option<Login>,
        date: Option<String>,
    }
    #[derive(Deserialize)]
    struct Commit {
        author: Option<Actor>,
        committer: Option<Actor>,
    }
    #[derive(Deserialize)]
    struct CommitNode {
        commit: Option<Commit>,
    }

    let qualifies = |actor: &Option<Actor>| {
        actor.as_ref().is_some_and(|a| {
            a.user.as_ref().is_some_and(|u| u.login == user)
                && a.date.as_deref().is_some_and(|d| window.contains_timestamp(d))
        })
    };

    keys.iter()
        .enumerate()
        .filter(|(i, _)| {
            let Some(commits) = data.pointer(&format!("/pr_{i}/pullRequest/commits")) else {
                return false;
            };
            let Ok(commits) = serde_json::from_value::<Connection<CommitNode>>(commits.clone())
            else {
                return false;
            };
            let found = commits
                .iter()
                .filter_map(|node| node.commit.as_ref())
                .any(|c| qualifies(&c.author) || qualifies(&c.committer));
            found
        })
        .map(|(_, key)| key.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// review discovery
// ---------------------------------------------------------------------------

/// "Reviewed by user" and "commented by user" searches scoped to PRs updated
/// in the window, aliased `reviewed` and `commented`.
pub fn build_review_search_query(
    org: Option<&str>,
    user: &str,
    window: &DateWindow,
) -> (String, Value) {
    let query = "\
query ReviewDiscovery($reviewQuery: String!, $commentQuery: String!) {
  reviewed: search(query: $reviewQuery, type: ISSUE, first: 100) {
    issueCount
    nodes {
      ... on PullRequest {
        number
        title
        url
        updatedAt
        author { login }
        repository {
          name
          owner { login }
        }
        reviews(first: 100) {
          nodes {
            author { login }
            submittedAt
            state
          }
        }
      }
    }
  }

  commented: search(query: $commentQuery, type: ISSUE, first: 100) {
    issueCount
    nodes {
      ... on PullRequest {
        number
        title
        url
        updatedAt
        author { login }
        repository {
          name
          owner { login }
        }
        comments(first: 100) {
          nodes {
            author { login }
            createdAt
          }
        }
      }
    }
  }
}"
    .to_string();
    let org = org_qualifier(org);
    let range = format!("{}..{}", window.from, window.to);
    let variables = json!({
        "reviewQuery": format!("{org}reviewed-by:{user} updated:{range} type:pr"),
        "commentQuery": format!("{org}commenter:{user} updated:{range} type:pr"),
    });
    (query, variables)
}

// ---------------------------------------------------------------------------
// details
// ---------------------------------------------------------------------------

/// Detail fields for every key; bodies and changed file paths are added when
/// `with_bodies` is set.
pub fn build_pr_details_query(keys: &[PrKey], with_bodies: bool) -> String {
    let extra = if with_bodies {
        "\n      body\n      files(first: 50) { nodes { path } }"
    } else {
        ""
    };
    let fragments: Vec<String> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            format!(
                "  pr_{i}: repository(owner: \"{org}\", name: \"{repo}\") {{
    pullRequest(number: {number}) {{
      number
      title
      state
      isDraft
      mergedAt
      additions
      deletions
      author {{ login }}
      url{extra}
    }}
  }}",
                org = escape(&key.org),
                repo = escape(&key.repo),
                number = key.number
            )
        })
        .collect();
    format!("{{\n{}\n}}", fragments.join("\n"))
}

/// Correlate a detail response with the key list it was built from. Keys
/// whose repository or PR resolved to null are absent from the result.
pub fn parse_pr_details_response(data: &Value, keys: &[PrKey]) -> HashMap<PrKey, PrDetail> {
    #[derive(Deserialize)]
    struct FileNode {
        path: String,
    }
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RawDetail {
        #[serde(default)]
        title: String,
        #[serde(default)]
        state: String,
        #[serde(default)]
        is_draft: bool,
        merged_at: Option<String>,
        additions: Option<u64>,
        deletions: Option<u64>,
        author: Option<Login>,
        body: Option<String>,
        files: Option<Connection<FileNode>>,
    }

    let mut result = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        let Some(raw) = data.pointer(&format!("/pr_{i}/pullRequest")) else {
            continue;
        };
        if raw.is_null() {
            continue;
        }
        let Ok(raw) = serde_json::from_value::<RawDetail>(raw.clone()) else {
            continue;
        };
        result.insert(
            key.clone(),
            PrDetail {
                title: raw.title,
                state: raw.state,
                is_draft: raw.is_draft,
                merged_at: raw.merged_at,
                additions: raw.additions.unwrap_or(0),
                deletions: raw.deletions.unwrap_or(0),
                author: raw.author.map(|a| a.login).filter(|l| !l.is_empty()),
                body: raw.body.filter(|b| !b.trim().is_empty()),
                changed_files: raw
                    .files
                    .map(|f| f.iter().map(|n| n.path.clone()).collect())
                    .unwrap_or_default(),
            },
        );
    }
    result
}

// ---------------------------------------------------------------------------
// waiting for review
// ---------------------------------------------------------------------------

/// Open, non-draft PRs authored by `user`, with their pending review requests.
pub fn build_waiting_for_review_query(org: Option<&str>, user: &str) -> (String, Value) {
    let query = "\
query WaitingForReview($searchQuery: String!) {
  search(query: $searchQuery, type: ISSUE, first: 50) {
    nodes {
      ... on PullRequest {
        number
        title
        isDraft
        createdAt
        url
        repository {
          name
          owner { login }
        }
        reviewRequests(first: 20) {
          nodes {
            requestedReviewer {
              ... on User { login }
              ... on Team { name slug }
            }
          }
        }
      }
    }
  }
}"
    .to_string();
    let variables = json!({
        "searchQuery": format!("{}author:{} state:open type:pr draft:false", org_qualifier(org), user),
    });
    (query, variables)
}

// ---------------------------------------------------------------------------
// single PR view (summarization tool)
// ---------------------------------------------------------------------------

pub fn build_pr_view_query(key: &PrKey) -> String {
    format!(
        "{{
  repository(owner: \"{org}\", name: \"{repo}\") {{
    pullRequest(number: {number}) {{
      title
      body
      state
      isDraft
      additions
      deletions
      files(first: 100) {{ nodes {{ path additions deletions }} }}
      reviews(first: 50) {{ nodes {{ author {{ login }} state body }} }}
      comments(first: 50) {{ nodes {{ author {{ login }} body }} }}
    }}
  }}
}}",
        org = escape(&key.org),
        repo = escape(&key.repo),
        number = key.number
    )
}
