use serde::Serialize;

/// Identity of a pull request across every data source: (organization,
/// repository name, number). No other identifier is used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrKey {
    pub org: String,
    pub repo: String,
    pub number: u64,
}

impl PrKey {
    pub fn new(org: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            org: org.into(),
            repo: repo.into(),
            number,
        }
    }

    /// `org/repo`, the display form used for grouping.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.org, self.repo)
    }
}

impl std::fmt::Display for PrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.org, self.repo, self.number)
    }
}

/// Lifecycle status of a PR. Variant order is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Status {
    Open,
    Draft,
    Merged,
    Closed,
}

impl Status {
    /// Precedence: merge timestamp, then draft flag, then the raw state
    /// string (case-insensitive), otherwise Open.
    pub fn derive(state: &str, is_draft: bool, merged_at: Option<&str>) -> Self {
        if merged_at.is_some_and(|m| !m.is_empty()) {
            return Status::Merged;
        }
        if is_draft {
            return Status::Draft;
        }
        if state.eq_ignore_ascii_case("merged") {
            Status::Merged
        } else if state.eq_ignore_ascii_case("closed") {
            Status::Closed
        } else {
            Status::Open
        }
    }

    pub fn is_in_progress(self) -> bool {
        matches!(self, Status::Open | Status::Draft)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Open => write!(f, "Open"),
            Status::Draft => write!(f, "Draft"),
            Status::Merged => write!(f, "Merged"),
            Status::Closed => write!(f, "Closed"),
        }
    }
}

/// How the user relates to a PR in the authored map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// User is the recorded author.
    Authored,
    /// User has commits on a PR someone else authored.
    Contributed,
}

/// Metadata returned by the enrichment query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrDetail {
    pub title: String,
    pub state: String,
    pub is_draft: bool,
    pub merged_at: Option<String>,
    pub additions: u64,
    pub deletions: u64,
    pub author: Option<String>,
    /// Only requested when a free-text summary is being prepared.
    pub body: Option<String>,
    pub changed_files: Vec<String>,
}

impl PrDetail {
    pub fn status(&self) -> Status {
        Status::derive(&self.state, self.is_draft, self.merged_at.as_deref())
    }
}

/// A PR the user authored or contributed commits to.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoredEntry {
    pub key: PrKey,
    pub title: String,
    pub status: Status,
    /// Zero unless the PR is still in progress.
    pub additions: u64,
    pub deletions: u64,
    pub contributed: bool,
    /// Recorded author when `contributed` is set.
    pub original_author: Option<String>,
    pub body: Option<String>,
    pub changed_files: Vec<String>,
}

impl AuthoredEntry {
    /// Build from an optional enrichment detail; a missing detail yields an
    /// empty title and Open status.
    pub fn new(key: PrKey, role: Role, detail: Option<&PrDetail>) -> Self {
        let fallback = PrDetail::default();
        let detail = detail.unwrap_or(&fallback);
        let status = detail.status();
        let (additions, deletions) = if status.is_in_progress() {
            (detail.additions, detail.deletions)
        } else {
            (0, 0)
        };
        let contributed = role == Role::Contributed;
        Self {
            key,
            title: detail.title.clone(),
            status,
            additions,
            deletions,
            contributed,
            original_author: if contributed { detail.author.clone() } else { None },
            body: detail.body.clone(),
            changed_files: detail.changed_files.clone(),
        }
    }
}

/// A PR the user reviewed or commented on without contributing commits.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewedEntry {
    pub key: PrKey,
    pub title: String,
    pub author: String,
    pub status: Status,
    pub body: Option<String>,
    pub changed_files: Vec<String>,
}

impl ReviewedEntry {
    pub fn new(key: PrKey, detail: Option<&PrDetail>) -> Self {
        let fallback = PrDetail::default();
        let detail = detail.unwrap_or(&fallback);
        Self {
            key,
            title: detail.title.clone(),
            author: detail.author.clone().unwrap_or_default(),
            status: detail.status(),
            body: detail.body.clone(),
            changed_files: detail.changed_files.clone(),
        }
    }
}

/// An open, non-draft PR authored by the user with outstanding review requests.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingEntry {
    pub key: PrKey,
    pub title: String,
    /// Pending reviewer logins and team slugs.
    pub reviewers: Vec<String>,
    /// `YYYY-MM-DD`
    pub created_at: String,
    pub days_waiting: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_derivation() {
        assert_eq!(Status::derive("MERGED", false, None), Status::Merged);
        assert_eq!(Status::derive("OPEN", true, None), Status::Draft);
        assert_eq!(Status::derive("OPEN", false, None), Status::Open);
        assert_eq!(Status::derive("CLOSED", false, None), Status::Closed);
        assert_eq!(Status::derive("closed", false, None), Status::Closed);
    }

    #[test]
    fn test_merged_at_wins_over_draft() {
        assert_eq!(
            Status::derive("OPEN", true, Some("2026-02-09T10:00:00Z")),
            Status::Merged
        );
        assert_eq!(Status::derive("CLOSED", false, Some("")), Status::Closed);
    }

    #[test]
    fn test_key_ordering_and_slug() {
        let a = PrKey::new("org", "alpha", 10);
        let b = PrKey::new("org", "alpha", 9);
        let c = PrKey::new("org", "beta", 1);
        assert!(b < a);
        assert!(a < c);
        assert_eq!(a.slug(), "org/alpha");
        assert_eq!(a.to_string(), "org/alpha#10");
    }

    #[test]
    fn test_stats_suppressed_once_merged_or_closed() {
        for state in ["MERGED", "CLOSED"] {
            let detail = PrDetail {
                title: "Fix parser".to_string(),
                state: state.to_string(),
                additions: 120,
                deletions: 30,
                ..Default::default()
            };
            let entry = AuthoredEntry::new(PrKey::new("o", "r", 1), Role::Authored, Some(&detail));
            assert_eq!((entry.additions, entry.deletions), (0, 0));
        }
    }

    #[test]
    fn test_stats_kept_while_in_progress() {
        let detail = PrDetail {
            state: "OPEN".to_string(),
            is_draft: true,
            additions: 5,
            deletions: 2,
            ..Default::default()
        };
        let entry = AuthoredEntry::new(PrKey::new("o", "r", 1), Role::Authored, Some(&detail));
        assert_eq!(entry.status, Status::Draft);
        assert_eq!((entry.additions, entry.deletions), (5, 2));
    }

    #[test]
    fn test_contributed_entry_keeps_original_author() {
        let detail = PrDetail {
            author: Some("bob".to_string()),
            state: "OPEN".to_string(),
            ..Default::default()
        };
        let key = PrKey::new("o", "r", 1);
        let contributed = AuthoredEntry::new(key.clone(), Role::Contributed, Some(&detail));
        assert!(contributed.contributed);
        assert_eq!(contributed.original_author.as_deref(), Some("bob"));

        let authored = AuthoredEntry::new(key, Role::Authored, Some(&detail));
        assert!(!authored.contributed);
        assert!(authored.original_author.is_none());
    }

    #[test]
    fn test_missing_detail_falls_back_to_empty() {
        let entry = ReviewedEntry::new(PrKey::new("o", "r", 3), None);
        assert_eq!(entry.title, "");
        assert_eq!(entry.author, "");
        assert_eq!(entry.status, Status::Open);
    }
}
