//! Deduplication and grouping of discovered PRs into renderer-neutral content.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::types::{ContentGroup, ContentItem, ContentSection, GroupBy, WAITING_HEADING};
use crate::pr::{AuthoredEntry, PrKey, ReviewedEntry, Status, WaitingEntry};

const WORKED_ON: &str = "Worked on";
const REVIEWED: &str = "Reviewed";

/// Display order of status headings.
const STATUS_ORDER: [&str; 5] = ["Open", "Draft", "Merged", "Closed", WAITING_HEADING];

/// The three category lists after deduplication. Every key appears in at
/// most one list.
#[derive(Debug)]
pub struct Deduped<'a> {
    pub authored: Vec<&'a AuthoredEntry>,
    pub reviewed: Vec<&'a ReviewedEntry>,
    pub waiting: Vec<&'a WaitingEntry>,
}

/// Priority waiting > authored/contributed > reviewed.
pub fn dedup<'a>(
    authored: &'a [AuthoredEntry],
    reviewed: &'a [ReviewedEntry],
    waiting: &'a [WaitingEntry],
) -> Deduped<'a> {
    let waiting_keys: HashSet<&PrKey> = waiting.iter().map(|pr| &pr.key).collect();

    let authored: Vec<&AuthoredEntry> = authored
        .iter()
        .filter(|pr| !waiting_keys.contains(&pr.key))
        .collect();
    let authored_keys: HashSet<&PrKey> = authored.iter().map(|pr| &pr.key).collect();

    let reviewed = reviewed
        .iter()
        .filter(|pr| !waiting_keys.contains(&pr.key) && !authored_keys.contains(&pr.key))
        .collect();

    Deduped {
        authored,
        reviewed,
        waiting: waiting.iter().collect(),
    }
}

fn authored_item(pr: &AuthoredEntry) -> ContentItem {
    ContentItem {
        title: pr.title.clone(),
        numbers: vec![pr.key.number],
        status: Some(pr.status),
        additions: pr.additions,
        deletions: pr.deletions,
        author: if pr.contributed {
            pr.original_author.clone()
        } else {
            None
        },
        ..Default::default()
    }
}

fn reviewed_item(pr: &ReviewedEntry) -> ContentItem {
    ContentItem {
        title: pr.title.clone(),
        numbers: vec![pr.key.number],
        status: Some(pr.status),
        author: Some(pr.author.clone()).filter(|a| !a.is_empty()),
        ..Default::default()
    }
}

fn waiting_item(pr: &WaitingEntry) -> ContentItem {
    ContentItem {
        title: pr.title.clone(),
        numbers: vec![pr.key.number],
        reviewers: pr.reviewers.clone(),
        days_waiting: pr.days_waiting,
        ..Default::default()
    }
}

fn status_heading(status: Status) -> &'static str {
    match status {
        Status::Open => "Open",
        Status::Draft => "Draft",
        Status::Merged => "Merged",
        Status::Closed => "Closed",
    }
}

fn sections_by_repo(items: BTreeMap<String, Vec<ContentItem>>) -> Vec<ContentSection> {
    items
        .into_iter()
        .map(|(heading, items)| ContentSection { heading, items })
        .collect()
}

/// Group the deduplicated lists per `group_by`. Empty groups and sections
/// are dropped.
pub fn regroup(
    authored: &[AuthoredEntry],
    reviewed: &[ReviewedEntry],
    waiting: &[WaitingEntry],
    group_by: GroupBy,
) -> Vec<ContentGroup> {
    let lists = dedup(authored, reviewed, waiting);
    match group_by {
        GroupBy::Contribution => by_contribution(&lists),
        GroupBy::Project => by_project(&lists),
        GroupBy::Status => by_status(&lists),
    }
}

fn by_contribution(lists: &Deduped<'_>) -> Vec<ContentGroup> {
    let mut groups = Vec::new();
    let mut push = |name: &str, items: BTreeMap<String, Vec<ContentItem>>| {
        if !items.is_empty() {
            groups.push(ContentGroup {
                name: name.to_string(),
                sections: sections_by_repo(items),
            });
        }
    };

    let mut worked_on: BTreeMap<String, Vec<ContentItem>> = BTreeMap::new();
    for pr in &lists.authored {
        worked_on.entry(pr.key.slug()).or_default().push(authored_item(pr));
    }
    push(WORKED_ON, worked_on);

    let mut reviewed: BTreeMap<String, Vec<ContentItem>> = BTreeMap::new();
    for pr in &lists.reviewed {
        reviewed.entry(pr.key.slug()).or_default().push(reviewed_item(pr));
    }
    push(REVIEWED, reviewed);

    let mut waiting: BTreeMap<String, Vec<ContentItem>> = BTreeMap::new();
    for pr in &lists.waiting {
        waiting.entry(pr.key.slug()).or_default().push(waiting_item(pr));
    }
    push(WAITING_HEADING, waiting);

    groups
}

fn by_project(lists: &Deduped<'_>) -> Vec<ContentGroup> {
    let mut repos: BTreeMap<String, BTreeMap<&str, Vec<ContentItem>>> = BTreeMap::new();
    for pr in &lists.authored {
        repos
            .entry(pr.key.slug())
            .or_default()
            .entry(status_heading(pr.status))
            .or_default()
            .push(authored_item(pr));
    }
    for pr in &lists.reviewed {
        repos
            .entry(pr.key.slug())
            .or_default()
            .entry(status_heading(pr.status))
            .or_default()
            .push(reviewed_item(pr));
    }
    for pr in &lists.waiting {
        repos
            .entry(pr.key.slug())
            .or_default()
            .entry(WAITING_HEADING)
            .or_default()
            .push(waiting_item(pr));
    }

    repos
        .into_iter()
        .map(|(repo, mut statuses)| ContentGroup {
            name: repo,
            sections: STATUS_ORDER
                .iter()
                .filter_map(|status| {
                    statuses.remove(status).map(|items| ContentSection {
                        heading: status.to_string(),
                        items,
                    })
                })
                .collect(),
        })
        .collect()
}

fn by_status(lists: &Deduped<'_>) -> Vec<ContentGroup> {
    let mut statuses: BTreeMap<&str, BTreeMap<String, Vec<ContentItem>>> = BTreeMap::new();
    for pr in &lists.authored {
        let mut item = authored_item(pr);
        item.status = None;
        statuses
            .entry(status_heading(pr.status))
            .or_default()
            .entry(pr.key.slug())
            .or_default()
            .push(item);
    }
    for pr in &lists.reviewed {
        let mut item = reviewed_item(pr);
        item.status = None;
        statuses
            .entry(status_heading(pr.status))
            .or_default()
            .entry(pr.key.slug())
            .or_default()
            .push(item);
    }
    for pr in &lists.waiting {
        statuses
            .entry(WAITING_HEADING)
            .or_default()
            .entry(pr.key.slug())
            .or_default()
            .push(waiting_item(pr));
    }

    STATUS_ORDER
        .iter()
        .filter_map(|status| {
            statuses.remove(status).map(|repos| ContentGroup {
                name: status.to_string(),
                sections: sections_by_repo(repos),
            })
        })
        .collect()
}

/// One PR in the free-text summary payload.
#[derive(Debug, Serialize)]
pub struct PayloadPr {
    pub number: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additions: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_files: Vec<String>,
}

/// Per-repository activity, empty categories omitted.
#[derive(Debug, Default, Serialize)]
pub struct RepoActivity {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authored: Vec<PayloadPr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contributed: Vec<PayloadPr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reviewed: Vec<PayloadPr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub waiting_for_review: Vec<PayloadPr>,
}

/// `repo → {authored, contributed, reviewed, waiting_for_review}` facts for
/// the short summary.
pub fn summary_payload(
    authored: &[AuthoredEntry],
    reviewed: &[ReviewedEntry],
    waiting: &[WaitingEntry],
) -> BTreeMap<String, RepoActivity> {
    let lists = dedup(authored, reviewed, waiting);
    let mut repos: BTreeMap<String, RepoActivity> = BTreeMap::new();

    for pr in lists.authored {
        let entry = PayloadPr {
            number: pr.key.number,
            title: pr.title.clone(),
            status: Some(pr.status),
            additions: Some(pr.additions),
            deletions: Some(pr.deletions),
            body: pr.body.clone().filter(|b| !b.is_empty()),
            changed_files: pr.changed_files.clone(),
        };
        let repo = repos.entry(pr.key.slug()).or_default();
        if pr.contributed {
            repo.contributed.push(entry);
        } else {
            repo.authored.push(entry);
        }
    }
    for pr in lists.reviewed {
        repos.entry(pr.key.slug()).or_default().reviewed.push(PayloadPr {
            number: pr.key.number,
            title: pr.title.clone(),
            status: Some(pr.status),
            additions: None,
            deletions: None,
            body: pr.body.clone().filter(|b| !b.is_empty()),
            changed_files: pr.changed_files.clone(),
        });
    }
    for pr in lists.waiting {
        repos.entry(pr.key.slug()).or_default().waiting_for_review.push(PayloadPr {
            number: pr.key.number,
            title: pr.title.clone(),
            status: None,
            additions: None,
            deletions: None,
            body: None,
            changed_files: Vec::new(),
        });
    }
    repos
}
