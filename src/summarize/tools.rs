use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::git::LocalGit;
use crate::github::queries::build_pr_view_query;
use crate::github::{GraphQl, PrDiffs};
use crate::pr::{parse_repo_slug, PrKey};

/// Tool output longer than this is cut with a note.
pub const TOOL_OUTPUT_MAX: usize = 8000;

/// Executes tool calls requested by a backend. Failures are reported to the
/// model as `Error: ...` text, never as a Rust error.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool descriptors in Messages API form.
    fn descriptors(&self) -> Vec<Value>;

    async fn execute(&self, name: &str, input: &Value) -> String;
}

/// Descriptors for the four inspection tools.
pub fn report_tool_descriptors() -> Vec<Value> {
    let repo = json!({"type": "string", "description": "Repository (owner/name)"});
    let number = json!({"type": "integer", "description": "PR number"});
    vec![
        json!({
            "name": "gh_pr_view",
            "description": "View GitHub PR details (title, body, state, reviews, changed files). \
                            Repo format: owner/name (e.g. 'octocat/hello-world').",
            "input_schema": {
                "type": "object",
                "properties": {"repo": repo, "number": number},
                "required": ["repo", "number"]
            }
        }),
        json!({
            "name": "gh_pr_diff",
            "description": "View the actual code diff of a GitHub PR. Repo format: owner/name.",
            "input_schema": {
                "type": "object",
                "properties": {"repo": repo, "number": number},
                "required": ["repo", "number"]
            }
        }),
        json!({
            "name": "git_log",
            "description": "View git commit history in a local repository. \
                            Provide the repo name (owner/name) and optional git log arguments.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "repo": repo,
                    "args": {
                        "type": "string",
                        "description": "Additional git log arguments (e.g. '--oneline -20')",
                        "default": "--oneline -20"
                    }
                },
                "required": ["repo"]
            }
        }),
        json!({
            "name": "git_diff",
            "description": "View diffs in a local repository. \
                            Provide the repo name (owner/name) and optional git diff arguments.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "repo": repo,
                    "args": {
                        "type": "string",
                        "description": "Git diff arguments (e.g. 'HEAD~5..HEAD --stat')",
                        "default": "HEAD~1"
                    }
                },
                "required": ["repo"]
            }
        }),
    ]
}

/// Cut `text` to [`TOOL_OUTPUT_MAX`] characters, noting the original length.
pub fn truncate_output(text: &str) -> String {
    let total = text.chars().count();
    if total <= TOOL_OUTPUT_MAX {
        return text.to_string();
    }
    let head: String = text.chars().take(TOOL_OUTPUT_MAX).collect();
    format!("{head}\n\n... (truncated, {total} total chars)")
}

#[derive(Debug, Deserialize)]
struct PrInput {
    repo: String,
    number: u64,
}

#[derive(Debug, Deserialize)]
struct GitInput {
    repo: String,
    args: Option<String>,
}

/// Tools backed by the GitHub client and the local clones found during
/// repository resolution.
pub struct ReportTools<'a> {
    pub github: &'a dyn GraphQl,
    pub diffs: &'a dyn PrDiffs,
    pub git: &'a dyn LocalGit,
    /// `owner/name` → local clone path
    pub repo_paths: BTreeMap<String, PathBuf>,
}

impl ReportTools<'_> {
    fn pr_key(input: &Value) -> Result<PrKey, String> {
        let input: PrInput = serde_json::from_value(input.clone()).map_err(|e| e.to_string())?;
        let (org, repo) = parse_repo_slug(&input.repo).map_err(|e| e.to_string())?;
        Ok(PrKey::new(org, repo, input.number))
    }

    async fn pr_view(&self, input: &Value) -> Result<String, String> {
        let key = Self::pr_key(input)?;
        let data = self
            .github
            .query(&build_pr_view_query(&key), None)
            .await
            .map_err(|e| e.to_string())?;
        let pr = data
            .pointer("/repository/pullRequest")
            .cloned()
            .unwrap_or(Value::Null);
        serde_json::to_string_pretty(&pr).map_err(|e| e.to_string())
    }

    async fn pr_diff(&self, input: &Value) -> Result<String, String> {
        let key = Self::pr_key(input)?;
        self.diffs.pr_diff(&key).await.map_err(|e| e.to_string())
    }

    async fn local(&self, subcommand: &str, input: &Value, default_args: &str) -> Result<String, String> {
        let input: GitInput = serde_json::from_value(input.clone()).map_err(|e| e.to_string())?;
        let Some(path) = self.repo_paths.get(&input.repo) else {
            let available: Vec<&str> = self.repo_paths.keys().map(String::as_str).collect();
            return Err(format!(
                "no local path for repo '{}'. Available: {:?}",
                input.repo, available
            ));
        };
        let args: Vec<String> = input
            .args
            .as_deref()
            .unwrap_or(default_args)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        self.git
            .run(path, subcommand, &args)
            .await
            .map(|out| out.trim().to_string())
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ToolExecutor for ReportTools<'_> {
    fn descriptors(&self) -> Vec<Value> {
        report_tool_descriptors()
    }

    async fn execute(&self, name: &str, input: &Value) -> String {
        debug!(tool = name, %input, "executing tool");
        let result = match name {
            "gh_pr_view" => self.pr_view(input).await,
            "gh_pr_diff" => self.pr_diff(input).await,
            "git_log" => self.local("log", input, "--oneline -20").await,
            "git_diff" => self.local("diff", input, "HEAD~1").await,
            other => Err(format!("unknown tool '{other}'")),
        };
        let output = match result {
            Ok(text) => truncate_output(&text),
            Err(message) => format!("Error: {}", message.chars().take(500).collect::<String>()),
        };
        debug!(tool = name, chars = output.len(), "tool result");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::tests::FakeGit;
    use crate::github::client::tests::FakeGraphQl;
    use crate::github::GitHubError;

    struct FakeDiffs;

    #[async_trait]
    impl PrDiffs for FakeDiffs {
        async fn pr_diff(&self, key: &PrKey) -> Result<String, GitHubError> {
            if key.number == 0 {
                return Err(GitHubError::Status { status: 404, body: "Not Found".into() });
            }
            Ok(format!("diff --git a/{0} b/{0}", key.repo))
        }
    }

    fn tools<'a>(github: &'a FakeGraphQl, git: &'a FakeGit) -> ReportTools<'a> {
        let mut repo_paths = BTreeMap::new();
        repo_paths.insert("dashpay/platform".to_string(), PathBuf::from("/src/platform"));
        ReportTools {
            github,
            diffs: &FakeDiffs,
            git,
            repo_paths,
        }
    }

    #[test]
    fn test_descriptor_names() {
        let names: Vec<String> = report_tool_descriptors()
            .iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["gh_pr_view", "gh_pr_diff", "git_log", "git_diff"]);
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("short"), "short");
        let long = "x".repeat(TOOL_OUTPUT_MAX + 5);
        let cut = truncate_output(&long);
        assert!(cut.starts_with(&"x".repeat(TOOL_OUTPUT_MAX)));
        assert!(cut.ends_with("\n\n... (truncated, 8005 total chars)"));
    }

    #[tokio::test]
    async fn test_git_tools_use_defaults_and_repo_map() {
        let github = FakeGraphQl::default();
        let git = FakeGit::default();
        let tools = tools(&github, &git);

        let log = tools.execute("git_log", &json!({"repo": "dashpay/platform"})).await;
        assert_eq!(log, "log --oneline -20");
        let diff = tools
            .execute("git_diff", &json!({"repo": "dashpay/platform", "args": "main..HEAD --stat"}))
            .await;
        assert_eq!(diff, "diff main..HEAD --stat");

        let missing = tools.execute("git_log", &json!({"repo": "dashpay/other"})).await;
        assert!(missing.starts_with("Error: no local path for repo 'dashpay/other'"));
    }

    #[tokio::test]
    async fn test_github_tools() {
        let github = FakeGraphQl::new(vec![Ok(json!({
            "repository": {"pullRequest": {"title": "Add cache", "state": "OPEN"}}
        }))]);
        let git = FakeGit::default();
        let tools = tools(&github, &git);

        let view = tools
            .execute("gh_pr_view", &json!({"repo": "dashpay/platform", "number": 42}))
            .await;
        assert!(view.contains("\"title\": \"Add cache\""));
        assert!(github.query_at(0).contains("pullRequest(number: 42)"));

        let diff = tools
            .execute("gh_pr_diff", &json!({"repo": "dashpay/platform", "number": 1}))
            .await;
        assert_eq!(diff, "diff --git a/platform b/platform");
        let failed = tools
            .execute("gh_pr_diff", &json!({"repo": "dashpay/platform", "number": 0}))
            .await;
        assert!(failed.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_bad_input_and_unknown_tool() {
        let github = FakeGraphQl::default();
        let git = FakeGit::default();
        let tools = tools(&github, &git);

        assert!(tools.execute("gh_pr_view", &json!({"repo": "dashpay/platform"})).await.starts_with("Error: "));
        assert!(tools.execute("gh_pr_view", &json!({"repo": "nope", "number": 1})).await.starts_with("Error: "));
        assert_eq!(tools.execute("rm_rf", &json!({})).await, "Error: unknown tool 'rm_rf'");
        assert_eq!(github.calls(), 0);
    }
}
