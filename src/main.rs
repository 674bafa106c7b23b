mod config;
mod discovery;
mod git;
mod github;
mod pr;
mod report;
mod summarize;
mod window;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::discovery::Discovery;
use crate::git::{discover_repos, fetch_repos, resolve_configured, GitCli, LocalGit, RepoInfo};
use crate::github::queries::{parse_viewer, VIEWER_QUERY};
use crate::github::{GitHubClient, GitHubError, GraphQl, RetryPolicy, RetryingClient};
use crate::report::{Format, GroupBy};
use crate::summarize::{Backend, ReportTools};
use crate::window::DateWindow;

/// Daily Report: collects the GitHub pull requests you authored, contributed
/// to, reviewed, or are waiting on reviewers for, and renders them as a report.
#[derive(Parser, Debug)]
#[command(name = "daily-report", version, about)]
struct Cli {
    /// GitHub organization to scope the report to (default: config, else all)
    #[arg(long)]
    org: Option<String>,

    /// GitHub username (default: config, else the token's owner)
    #[arg(long)]
    user: Option<String>,

    /// Single date, YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<String>,

    /// Start of an inclusive date range, YYYY-MM-DD
    #[arg(long = "from")]
    from: Option<String>,

    /// End of an inclusive date range, YYYY-MM-DD
    #[arg(long = "to")]
    to: Option<String>,

    /// Path to a config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory containing local clones to scan
    #[arg(long)]
    repos_dir: Option<PathBuf>,

    /// Extra git author email to match (repeatable)
    #[arg(long = "git-email")]
    git_emails: Vec<String>,

    /// Skip local git discovery and use remote search only
    #[arg(long)]
    no_local: bool,

    /// How to group the report
    #[arg(long, value_enum, default_value_t = GroupBy::Contribution)]
    group_by: GroupBy,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Markdown)]
    format: Format,

    /// Merge related PRs into consolidated bullets with an AI model
    #[arg(long)]
    consolidate: bool,

    /// Replace the stats line with an AI-written summary
    #[arg(long)]
    summary: bool,

    /// Claude model for --consolidate / --summary
    #[arg(long)]
    model: Option<String>,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if std::env::var_os("RUST_LOG").is_some() || !cli.verbose {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("debug")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let today = chrono::Local::now().date_naive();
    let window = DateWindow::from_args(
        cli.date.as_deref(),
        cli.from.as_deref(),
        cli.to.as_deref(),
        today,
    )?;

    if cli.model.is_some() && !cli.consolidate && !cli.summary {
        return Err("--model requires --consolidate or --summary".into());
    }

    info!("loading configuration");
    let config = Config::load(cli.config.as_deref())?;
    let token = config.github_token().ok_or(GitHubError::MissingToken)?;
    let github = RetryingClient::new(GitHubClient::new(token), RetryPolicy::default());

    let user = match cli.user.clone().or_else(|| config.default_user.clone()) {
        Some(user) => user,
        None => {
            info!("resolving user from token");
            let data = github.query(VIEWER_QUERY, None).await?;
            parse_viewer(&data).ok_or("could not determine GitHub user; pass --user")?
        }
    };
    let org = cli.org.clone().or_else(|| config.default_org.clone());

    let _main_span = info_span!("daily_report", user = %user, window = %window).entered();

    let git: Arc<dyn LocalGit> = Arc::new(GitCli::new(config.fetch_timeout()));
    let repos = if cli.no_local {
        Vec::new()
    } else {
        resolve_local_repos(&cli, &config, git.as_ref(), org.as_deref()).await
    };
    if !repos.is_empty() {
        fetch_repos(Arc::clone(&git), &repos).await;
    }

    let mut authors = vec![user.clone()];
    for email in config.git_emails.iter().chain(&cli.git_emails) {
        if !authors.contains(email) {
            authors.push(email.clone());
        }
    }

    let excluded_bots = config.excluded_bots();
    let discovery = Discovery {
        github: &github,
        user: &user,
        org: org.as_deref(),
        window,
        excluded_bots: &excluded_bots,
        with_bodies: cli.summary,
    };
    info!(repos = repos.len(), "discovering PRs");
    let findings = discovery.run(git.as_ref(), &repos, &authors).await?;

    let group_by = if cli.consolidate {
        if cli.group_by != GroupBy::Contribution {
            warn!(group_by = ?cli.group_by, "--group-by is ignored with --consolidate");
        }
        GroupBy::Contribution
    } else {
        cli.group_by
    };
    let mut built_report = report::build(&user, window, findings, group_by);

    if cli.consolidate || cli.summary {
        let model = cli.model.as_deref().unwrap_or(config.model());
        let backend = Backend::select(model, std::env::var("ANTHROPIC_API_KEY").ok());

        if cli.consolidate {
            info!(model, "consolidating report");
            let tools = ReportTools {
                github: &github,
                diffs: &github,
                git: git.as_ref(),
                repo_paths: repo_paths(&repos),
            };
            built_report.content = summarize::consolidate(
                &backend,
                &tools,
                &built_report.content,
                config.ai.consolidate_prompt.as_deref(),
            )
            .await?;
        }

        if cli.summary {
            info!(model, "generating AI summary");
            let summary = summarize::prepare_ai_summary(
                &backend,
                &built_report,
                config.ai.summary_prompt.as_deref(),
            )
            .await?;
            built_report.summary.ai_summary = Some(summary).filter(|s| !s.is_empty());
        }
    }

    report::output(&built_report, cli.format)?;
    info!(
        authored = built_report.authored.len(),
        reviewed = built_report.reviewed.len(),
        waiting = built_report.waiting.len(),
        "done"
    );
    Ok(())
}

/// Scan the repos directory when one is given, else use the configured list.
async fn resolve_local_repos(
    cli: &Cli,
    config: &Config,
    git: &dyn LocalGit,
    org: Option<&str>,
) -> Vec<RepoInfo> {
    let repos_dir = cli
        .repos_dir
        .as_deref()
        .map(config::expand_path)
        .or_else(|| config.repos_dir.clone());
    match repos_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "scanning for local repositories");
            discover_repos(git, &dir, org).await
        }
        None => resolve_configured(git, &config.repos, org, config.default_org.as_deref()).await,
    }
}

fn repo_paths(repos: &[RepoInfo]) -> BTreeMap<String, PathBuf> {
    repos
        .iter()
        .map(|repo| (repo.slug(), repo.path.clone()))
        .collect()
}
