use super::types::{ContentItem, GroupBy, ReportData, SummaryStats};
use crate::pr::{pr_link, Status};

/// Render the full report as Markdown. Lines are joined with `\n` and the
/// output carries no trailing newline.
pub fn render(report: &ReportData) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("# Daily Report — {}", report.window));
    lines.push(String::new());

    if report.content.is_empty() {
        lines.push("_No PR activity found._".to_string());
        lines.push(String::new());
    }

    let project = report.group_by == GroupBy::Project;
    for group in &report.content {
        if project {
            lines.push(format!("## `{}`", group.name));
        } else {
            lines.push(format!("## {}", group.name));
        }
        lines.push(String::new());
        for section in &group.sections {
            if project {
                lines.push(format!("- **{}**", section.heading));
            } else {
                lines.push(format!("- **`{}`**", section.heading));
            }
            let repo = report.link_repo(group, section);
            for item in &section.items {
                lines.push(format!("  - {}", render_item(item, repo)));
            }
        }
        lines.push(String::new());
    }

    lines.push(format!("**Summary:** {}", summary_text(&report.summary)));
    lines.join("\n")
}

/// The sentence after `**Summary:**`, shared with the terminal renderer.
pub fn summary_text(summary: &SummaryStats) -> String {
    if let Some(ai) = summary.ai_summary.as_deref() {
        return ai.to_string();
    }
    let themes = if summary.themes.is_empty() {
        "general development".to_string()
    } else {
        summary.themes.join(", ")
    };
    let merged_label = if summary.is_range { "merged" } else { "merged today" };
    format!(
        "{} PRs across {} repos, {} {}, {} still open. Key themes: {}.",
        summary.total_prs,
        summary.repo_count,
        summary.merged_count,
        merged_label,
        summary.open_count,
        themes
    )
}

fn link(repo: &str, number: u64) -> String {
    format!("[#{}]({})", number, pr_link(repo, number))
}

fn render_item(item: &ContentItem, repo: &str) -> String {
    let mut text = item.title.clone();

    match item.numbers.as_slice() {
        [] => {}
        [number] => {
            text.push(' ');
            text.push_str(&link(repo, *number));
        }
        numbers => {
            let refs: Vec<String> = numbers.iter().map(|n| link(repo, *n)).collect();
            text.push_str(&format!(" ({})", refs.join(", ")));
        }
    }

    if let Some(author) = item.author.as_deref().filter(|a| !a.is_empty()) {
        text.push_str(&format!(" ({author})"));
    }

    if let Some(status) = item.status {
        text.push_str(&format!(" — **{status}**"));
        if matches!(status, Status::Open | Status::Draft) && (item.additions > 0 || item.deletions > 0) {
            text.push_str(&format!(" (+{}/−{})", item.additions, item.deletions));
        }
    }

    if !item.reviewers.is_empty() {
        let reviewers: Vec<String> = item.reviewers.iter().map(|r| format!("**{r}**")).collect();
        text.push_str(&format!(" — reviewer: {}", reviewers.join(", ")));
    }

    if item.days_waiting != 0 {
        text.push_str(&format!(" — {} days", item.days_waiting));
    }

    text
}
