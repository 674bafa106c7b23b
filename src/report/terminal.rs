use colored::{ColoredString, Colorize};

use super::markdown::summary_text;
use super::types::{ContentItem, ReportData};
use crate::pr::Status;

/// Render the report with ANSI colors for an interactive terminal. Same
/// structure as the Markdown output without link syntax.
pub fn render(report: &ReportData) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "{} {}\n",
        "Daily Report".bold(),
        report.window.to_string().bold()
    ));
    out.push_str(&format!("User: {}\n\n", report.user));

    if report.content.is_empty() {
        out.push_str(&format!("  {}\n\n", "No PR activity found.".dimmed()));
    }

    for group in &report.content {
        out.push_str(&format!("═══ {} ═══\n", group.name.bold()));
        for section in &group.sections {
            out.push_str(&format!("  {}\n", section.heading.cyan().bold()));
            let repo = report.link_repo(group, section);
            for item in &section.items {
                out.push_str(&format!("    • {}\n", render_item(item, repo)));
            }
        }
        out.push('\n');
    }

    out.push_str(&format!("{} {}\n", "Summary:".bold(), summary_text(&report.summary)));
    out
}

fn render_item(item: &ContentItem, repo: &str) -> String {
    let mut text = item.title.clone();

    if !item.numbers.is_empty() {
        let refs: Vec<String> = item.numbers.iter().map(|n| format!("{repo}#{n}")).collect();
        text.push_str(&format!(" {}", refs.join(", ").dimmed()));
    }
    if let Some(author) = item.author.as_deref().filter(|a| !a.is_empty()) {
        text.push_str(&format!(" ({author})"));
    }
    if let Some(status) = item.status {
        text.push_str(&format!(" {}", colorize_status(status)));
        if status.is_in_progress() && (item.additions > 0 || item.deletions > 0) {
            text.push_str(&format!(
                " {}/{}",
                format!("+{}", item.additions).green(),
                format!("-{}", item.deletions).red()
            ));
        }
    }
    if !item.reviewers.is_empty() {
        text.push_str(&format!(" reviewer: {}", item.reviewers.join(", ").yellow()));
    }
    if item.days_waiting != 0 {
        text.push_str(&format!(" ({} days)", item.days_waiting));
    }
    text
}

fn colorize_status(status: Status) -> ColoredString {
    match status {
        Status::Open => "OPEN".green().bold(),
        Status::Draft => "DRAFT".dimmed().bold(),
        Status::Merged => "MERGED".magenta().bold(),
        Status::Closed => "CLOSED".red().bold(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample;
    use crate::window::DateWindow;
    use chrono::NaiveDate;

    #[test]
    fn test_terminal_report_contains_every_item() {
        let report = sample(DateWindow::single(NaiveDate::from_ymd_opt(2026, 2, 9).unwrap()));
        let text = render(&report);
        assert!(text.contains("Worked on"));
        assert!(text.contains("dashpay/platform#5"));
        assert!(text.contains("fix: review 3"));
        assert!(text.contains("carol"));
        assert!(text.contains("(8 days)"));
        assert!(text.contains("2 merged today"));
    }

    #[test]
    fn test_terminal_empty_report() {
        let mut report = sample(DateWindow::single(NaiveDate::from_ymd_opt(2026, 2, 9).unwrap()));
        report.content.clear();
        assert!(render(&report).contains("No PR activity found."));
    }
}
