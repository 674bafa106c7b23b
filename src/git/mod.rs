pub mod commits;
pub mod repos;

pub use commits::{extract_pr_numbers, find_commits, GitCommit};
pub use repos::{discover_repos, fetch_repos, parse_remote_url, resolve_configured, RepoInfo};

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Separates fields in `git log` output; never appears in subjects.
const FIELD_SEP: char = '\x1f';

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("git {command} exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// The local version-control facility.
#[async_trait]
pub trait LocalGit: Send + Sync {
    /// URL of the `origin` remote.
    async fn remote_url(&self, repo: &Path) -> Result<String, GitError>;

    /// Sync all remotes.
    async fn fetch(&self, repo: &Path) -> Result<(), GitError>;

    /// Non-merge commits on any ref by `author` between `after` and `before`.
    async fn log(
        &self,
        repo: &Path,
        author: &str,
        after: NaiveDate,
        before: NaiveDate,
    ) -> Result<Vec<GitCommit>, GitError>;

    /// Run an arbitrary read-only subcommand (`log`, `diff`) and return stdout.
    async fn run(&self, repo: &Path, subcommand: &str, args: &[String]) -> Result<String, GitError>;
}

/// [`LocalGit`] backed by the `git` executable. Every invocation is bounded
/// by a timeout; a timed-out child is killed.
#[derive(Debug, Clone)]
pub struct GitCli {
    pub fetch_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl GitCli {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self {
            fetch_timeout,
            ..Self::default()
        }
    }

    async fn git(&self, repo: &Path, args: &[String], timeout: Duration) -> Result<String, GitError> {
        let command = args.first().cloned().unwrap_or_default();
        debug!(repo = %repo.display(), ?args, "running git");
        let child = Command::new("git")
            .arg("-C")
            .arg(repo)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(GitError::Timeout {
                    command,
                    seconds: timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(GitError::Failed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl LocalGit for GitCli {
    async fn remote_url(&self, repo: &Path) -> Result<String, GitError> {
        let args = ["remote", "get-url", "origin"].map(String::from);
        let url = self.git(repo, &args, Duration::from_secs(10)).await?;
        Ok(url.trim().to_string())
    }

    async fn fetch(&self, repo: &Path) -> Result<(), GitError> {
        let args = ["fetch", "--all", "--quiet"].map(String::from);
        self.git(repo, &args, self.fetch_timeout).await.map(|_| ())
    }

    async fn log(
        &self,
        repo: &Path,
        author: &str,
        after: NaiveDate,
        before: NaiveDate,
    ) -> Result<Vec<GitCommit>, GitError> {
        let args = vec![
            "log".to_string(),
            "--all".to_string(),
            format!("--author={}", author),
            "--no-merges".to_string(),
            format!("--after={}", after),
            format!("--before={}", before),
            "--format=%H%x1f%s%x1f%ae%x1f%aI".to_string(),
        ];
        let stdout = self.git(repo, &args, self.command_timeout).await?;
        Ok(parse_log_output(&stdout))
    }

    async fn run(&self, repo: &Path, subcommand: &str, args: &[String]) -> Result<String, GitError> {
        let mut full = vec![subcommand.to_string()];
        full.extend(args.iter().cloned());
        self.git(repo, &full, self.command_timeout).await
    }
}

/// Parse `hash<US>subject<US>email<US>iso-date` lines. Malformed lines are
/// dropped.
pub fn parse_log_output(stdout: &str) -> Vec<GitCommit> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(4, FIELD_SEP);
            let sha = parts.next()?;
            let subject = parts.next()?;
            let author_email = parts.next()?;
            let author_date = parts.next()?;
            Some(GitCommit {
                sha: sha.to_string(),
                subject: subject.to_string(),
                author_email: author_email.to_string(),
                author_date: author_date.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory git: remotes and per-(repo, author) commit lists.
    #[derive(Default)]
    pub struct FakeGit {
        pub remotes: HashMap<PathBuf, String>,
        pub commits: HashMap<(PathBuf, String), Vec<GitCommit>>,
        pub failing_logs: Vec<PathBuf>,
        pub log_calls: Mutex<Vec<(PathBuf, String, NaiveDate, NaiveDate)>>,
        pub fetched: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl LocalGit for FakeGit {
        async fn remote_url(&self, repo: &Path) -> Result<String, GitError> {
            self.remotes.get(repo).cloned().ok_or_else(|| GitError::Failed {
                command: "remote".to_string(),
                code: Some(2),
                stderr: "No such remote 'origin'".to_string(),
            })
        }

        async fn fetch(&self, repo: &Path) -> Result<(), GitError> {
            self.fetched.lock().unwrap().push(repo.to_path_buf());
            Ok(())
        }

        async fn log(
            &self,
            repo: &Path,
            author: &str,
            after: NaiveDate,
            before: NaiveDate,
        ) -> Result<Vec<GitCommit>, GitError> {
            self.log_calls
                .lock()
                .unwrap()
                .push((repo.to_path_buf(), author.to_string(), after, before));
            if self.failing_logs.iter().any(|p| p == repo) {
                return Err(GitError::Timeout {
                    command: "log".to_string(),
                    seconds: 30,
                });
            }
            Ok(self
                .commits
                .get(&(repo.to_path_buf(), author.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn run(&self, _repo: &Path, subcommand: &str, args: &[String]) -> Result<String, GitError> {
            Ok(format!("{} {}", subcommand, args.join(" ")))
        }
    }

    pub fn commit(sha: &str, subject: &str, date: &str) -> GitCommit {
        GitCommit {
            sha: sha.to_string(),
            subject: subject.to_string(),
            author_email: "alice@example.com".to_string(),
            author_date: date.to_string(),
        }
    }

    #[test]
    fn test_parse_log_output() {
        let out = "abc\x1fFix parser | lexer (#42)\x1falice@example.com\x1f2026-02-09T10:00:00+01:00\n\
                   \n\
                   broken line\n\
                   def\x1fAdd docs\x1fbob@example.com\x1f2026-02-08T09:00:00Z\n";
        let commits = parse_log_output(out);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].subject, "Fix parser | lexer (#42)");
        assert_eq!(commits[1].author_email, "bob@example.com");
    }
}
