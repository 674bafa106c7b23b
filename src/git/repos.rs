use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::LocalGit;
use crate::config::RepoConfig;

/// `git@host:org/name(.git)`
static SSH_REMOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@/\s]+@[^:/\s]+:([^/\s]+)/([^/\s]+?)(?:\.git)?/?$").unwrap());
/// `https://host/org/name(.git)`, also `ssh://git@host/org/name`
static URL_REMOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?|ssh|git)://(?:[^@/\s]+@)?[^/\s]+/([^/\s]+)/([^/\s]+?)(?:\.git)?/?$")
        .unwrap()
});

/// A local clone and the hosted repository it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    /// Real path (symlinks resolved).
    pub path: PathBuf,
    pub org: String,
    pub name: String,
}

impl RepoInfo {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.org, self.name)
    }
}

/// Extract `(org, name)` from an SSH-style or URL-style remote.
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let url = url.trim();
    SSH_REMOTE
        .captures(url)
        .or_else(|| URL_REMOTE.captures(url))
        .map(|c| (c[1].to_string(), c[2].to_string()))
}

fn org_matches(org: &str, filter: Option<&str>) -> bool {
    filter.map_or(true, |f| f.eq_ignore_ascii_case(org))
}

/// Find clones directly under `dir` whose origin belongs to `org`
/// (case-insensitive; every org when `None`).
///
/// Unreadable entries and unparseable remotes are skipped with a warning.
#[instrument(skip(git), fields(dir = %dir.display()))]
pub async fn discover_repos(git: &dyn LocalGit, dir: &Path, org: Option<&str>) -> Vec<RepoInfo> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "cannot list repos directory");
            return Vec::new();
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir() && path.join(".git").exists())
        .collect();
    candidates.sort();

    let mut repos = Vec::new();
    for candidate in candidates {
        let real = match candidate.canonicalize() {
            Ok(real) => real,
            Err(e) => {
                warn!(path = %candidate.display(), error = %e, "cannot resolve repository path");
                continue;
            }
        };
        let url = match git.remote_url(&real).await {
            Ok(url) => url,
            Err(e) => {
                warn!(path = %real.display(), error = %e, "cannot read origin remote");
                continue;
            }
        };
        let Some((repo_org, name)) = parse_remote_url(&url) else {
            warn!(path = %real.display(), url = %url, "unrecognised remote URL");
            continue;
        };
        if org_matches(&repo_org, org) {
            debug!(path = %real.display(), org = %repo_org, name = %name, "found repository");
            repos.push(RepoInfo {
                path: real,
                org: repo_org,
                name,
            });
        }
    }
    repos
}

/// Turn configured repositories into [`RepoInfo`]s, detecting org/name from
/// the origin remote when the entry leaves them out.
pub async fn resolve_configured(
    git: &dyn LocalGit,
    configured: &[RepoConfig],
    org: Option<&str>,
    default_org: Option<&str>,
) -> Vec<RepoInfo> {
    let mut repos = Vec::new();
    for entry in configured {
        let path = entry.path.canonicalize().unwrap_or_else(|_| entry.path.clone());
        let (mut repo_org, mut name) = (entry.org.clone(), entry.name.clone());
        if repo_org.is_none() || name.is_none() {
            let detected = match git.remote_url(&path).await {
                Ok(url) => parse_remote_url(&url),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read origin remote");
                    None
                }
            };
            if let Some((detected_org, detected_name)) = detected {
                repo_org = repo_org.or(Some(detected_org));
                name = name.or(Some(detected_name));
            }
        }
        let repo_org = repo_org.or_else(|| default_org.map(str::to_string));
        let (Some(repo_org), Some(name)) = (repo_org, name) else {
            warn!(path = %path.display(), "skipping repository without org/name");
            continue;
        };
        if org_matches(&repo_org, org) {
            repos.push(RepoInfo {
                path,
                org: repo_org,
                name,
            });
        }
    }
    repos
}

/// Fetch every repository concurrently, one task per repository. Each fetch
/// is bounded by the git timeout; all tasks are awaited and failures are only
/// logged. Returns `slug -> success`.
pub async fn fetch_repos(git: Arc<dyn LocalGit>, repos: &[RepoInfo]) -> BTreeMap<String, bool> {
    let mut tasks = JoinSet::new();
    for repo in repos {
        let git = Arc::clone(&git);
        let repo = repo.clone();
        tasks.spawn(async move {
            let result = git.fetch(&repo.path).await;
            (repo.slug(), result)
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((slug, Ok(()))) => {
                results.insert(slug, true);
            }
            Ok((slug, Err(e))) => {
                warn!(repo = %slug, error = %e, "git fetch failed");
                results.insert(slug, false);
            }
            Err(e) => warn!(error = %e, "fetch task panicked"),
        }
    }
    info!(
        fetched = results.values().filter(|ok| **ok).count(),
        total = repos.len(),
        "fetched repositories"
    );
    results
}
