use serde::Serialize;

use crate::pr::{AuthoredEntry, ReviewedEntry, Status, WaitingEntry};
use crate::window::DateWindow;

/// Heading used for waiting PRs wherever a status would appear.
pub const WAITING_HEADING: &str = "Waiting for Review";

/// Top-level grouping of the rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum GroupBy {
    /// Worked on / Reviewed / Waiting for Review, then repository
    #[default]
    Contribution,
    /// Repository, then status
    Project,
    /// Status, then repository
    Status,
}

/// Output renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    #[default]
    Markdown,
    /// Colored output for an interactive terminal
    Terminal,
}

/// Aggregate counters shown in the summary line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryStats {
    /// Authored plus reviewed PRs
    pub total_prs: usize,
    pub repo_count: usize,
    pub merged_count: usize,
    /// Authored PRs still Open or Draft
    pub open_count: usize,
    /// Conventional-commit prefixes seen in titles, first-seen order
    pub themes: Vec<String>,
    pub is_range: bool,
    /// Replaces the counters in the summary line when set
    pub ai_summary: Option<String>,
}

/// A single leaf of the grouped report. Empty fields are omitted when
/// serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentItem {
    pub title: String,
    /// Several numbers once consolidation merges related PRs.
    pub numbers: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "is_zero")]
    pub additions: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub deletions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reviewers: Vec<String>,
    #[serde(skip_serializing_if = "is_zero_days")]
    pub days_waiting: i64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

fn is_zero_days(value: &i64) -> bool {
    *value == 0
}

/// Second-level grouping: a repository or a status, depending on mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentSection {
    pub heading: String,
    pub items: Vec<ContentItem>,
}

/// First-level grouping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentGroup {
    pub name: String,
    pub sections: Vec<ContentSection>,
}

/// Everything a renderer needs.
#[derive(Debug, Clone)]
pub struct ReportData {
    pub user: String,
    pub window: DateWindow,
    pub authored: Vec<AuthoredEntry>,
    pub reviewed: Vec<ReviewedEntry>,
    pub waiting: Vec<WaitingEntry>,
    pub summary: SummaryStats,
    pub content: Vec<ContentGroup>,
    /// Mode the content was grouped with; decides where PR links point.
    pub group_by: GroupBy,
}

impl ReportData {
    /// Repository slug an item's PR numbers belong to.
    pub fn link_repo<'a>(&self, group: &'a ContentGroup, section: &'a ContentSection) -> &'a str {
        match self.group_by {
            GroupBy::Project => &group.name,
            GroupBy::Contribution | GroupBy::Status => &section.heading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_serialization_omits_defaults() {
        let item = ContentItem {
            title: "Fix parser".to_string(),
            numbers: vec![42],
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            serde_json::json!({"title": "Fix parser", "numbers": [42]})
        );

        let full = ContentItem {
            title: "Add cache".to_string(),
            numbers: vec![7],
            status: Some(Status::Open),
            additions: 10,
            deletions: 0,
            author: Some("bob".to_string()),
            reviewers: vec![],
            days_waiting: 3,
        };
        let value = serde_json::to_value(&full).unwrap();
        assert_eq!(value["status"], "Open");
        assert_eq!(value["additions"], 10);
        assert!(value.get("deletions").is_none());
        assert!(value.get("reviewers").is_none());
        assert_eq!(value["days_waiting"], 3);
    }

    #[test]
    fn test_default_grouping() {
        assert_eq!(GroupBy::default(), GroupBy::Contribution);
        assert_eq!(Format::default(), Format::Markdown);
    }
}
