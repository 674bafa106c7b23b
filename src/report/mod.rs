pub mod content;
pub mod markdown;
pub mod terminal;
pub mod types;

pub use types::{
    ContentGroup, ContentItem, ContentSection, Format, GroupBy, ReportData, SummaryStats,
};

use std::collections::BTreeSet;
use std::io::Write;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::discovery::Findings;
use crate::pr::Status;
use crate::window::DateWindow;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Write(#[from] std::io::Error),
}

const THEME_PREFIXES: [&str; 13] = [
    "fix", "feat", "chore", "refactor", "build", "ci", "docs", "style", "perf", "test", "revert",
    "deps", "release",
];

/// Conventional-commit prefixes found at the start of titles, in first-seen
/// order.
pub fn extract_themes<'a>(titles: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut themes: Vec<String> = Vec::new();
    for title in titles {
        let lower = title.trim().to_lowercase();
        let found = THEME_PREFIXES.iter().find(|prefix| {
            lower
                .strip_prefix(*prefix)
                .is_some_and(|rest| rest.starts_with(':') || rest.starts_with('('))
        });
        if let Some(prefix) = found {
            if !themes.iter().any(|t| t == prefix) {
                themes.push(prefix.to_string());
            }
        }
    }
    themes
}

/// Assemble the report from discovery findings. Content is grouped per
/// `group_by`; the caller may replace it with a consolidated version.
pub fn build(user: &str, window: DateWindow, findings: Findings, group_by: GroupBy) -> ReportData {
    let Findings {
        authored,
        reviewed,
        waiting,
    } = findings;

    let titles = authored
        .iter()
        .map(|pr| pr.title.as_str())
        .chain(reviewed.iter().map(|pr| pr.title.as_str()));
    let themes = extract_themes(titles);

    let repos: BTreeSet<String> = authored
        .iter()
        .map(|pr| pr.key.slug())
        .chain(reviewed.iter().map(|pr| pr.key.slug()))
        .collect();

    let merged_count = authored.iter().filter(|pr| pr.status == Status::Merged).count()
        + reviewed.iter().filter(|pr| pr.status == Status::Merged).count();

    let summary = SummaryStats {
        total_prs: authored.len() + reviewed.len(),
        repo_count: repos.len(),
        merged_count,
        open_count: authored.iter().filter(|pr| pr.status.is_in_progress()).count(),
        themes,
        is_range: window.is_range(),
        ai_summary: None,
    };

    let content = content::regroup(&authored, &reviewed, &waiting, group_by);

    ReportData {
        user: user.to_string(),
        window,
        authored,
        reviewed,
        waiting,
        summary,
        content,
        group_by,
    }
}

/// Render the report and write it to stdout.
#[instrument(skip(report), fields(user = %report.user, window = %report.window))]
pub fn output(report: &ReportData, format: Format) -> Result<(), ReportError> {
    let rendered = match format {
        Format::Markdown => {
            debug!("rendering markdown");
            markdown::render(report)
        }
        Format::Terminal => {
            debug!("rendering terminal report");
            terminal::render(report)
        }
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    stdout.flush()?;
    Ok(())
}
