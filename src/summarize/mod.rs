pub mod anthropic;
pub mod cli;
pub mod consolidate;
pub mod tools;

pub use anthropic::AnthropicBackend;
pub use cli::CliBackend;
pub use consolidate::consolidate;
pub use tools::{ReportTools, ToolExecutor};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::report::content::summary_payload;
use crate::report::ReportData;

const SUMMARY_PROMPT: &str = "\
You write the one-paragraph summary line of a developer's daily pull request report. \
The input is JSON keyed by repository, listing PRs the developer authored, contributed \
commits to, reviewed, or is waiting on reviewers for. Describe what was accomplished in \
plain language, grouping related work and naming the main areas touched. Do not list PR \
numbers.";

const SUMMARY_FORMAT: &str = "\
Max 200 characters. Return ONLY the summary text, nothing else: no quotes, no labels, no JSON.";

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("Claude API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Claude API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("claude CLI not found. Install it or set ANTHROPIC_API_KEY.")]
    CliNotFound,

    #[error("claude CLI exited with {code:?}: {stderr}")]
    CliFailed { code: Option<i32>, stderr: String },

    #[error("claude CLI timed out after {0}s")]
    CliTimeout(u64),

    #[error("failed to run claude CLI: {0}")]
    Io(#[from] std::io::Error),

    #[error("AI backend returned an empty response")]
    EmptyResponse,

    #[error("Failed to decode Claude API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("AI consolidation output is invalid after one correction: {0}")]
    InvalidOutput(String),

    #[error("AI call exceeded {0} tool-use turns without completing")]
    TurnLimit(usize),
}

/// A system instruction plus the user payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// The text-completion facility.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, SummarizeError>;

    /// Completion that may call `tools` before answering. Backends without a
    /// tool loop answer from the prompt alone.
    async fn complete_with_tools(
        &self,
        prompt: &Prompt,
        _tools: &dyn ToolExecutor,
    ) -> Result<String, SummarizeError> {
        self.complete(prompt).await
    }
}

/// Backend chosen once at startup: the Messages API when an API key is
/// available, else the `claude` CLI.
pub enum Backend {
    Api(AnthropicBackend),
    Cli(CliBackend),
}

impl Backend {
    pub fn select(model: &str, api_key: Option<String>) -> Self {
        match api_key.filter(|k| !k.is_empty()) {
            Some(key) => {
                debug!(model, "using Claude API backend");
                Backend::Api(AnthropicBackend::new(key, model))
            }
            None => {
                debug!(model, "ANTHROPIC_API_KEY not set, using claude CLI backend");
                Backend::Cli(CliBackend::new(model))
            }
        }
    }
}

#[async_trait]
impl Summarizer for Backend {
    async fn complete(&self, prompt: &Prompt) -> Result<String, SummarizeError> {
        match self {
            Backend::Api(api) => api.complete(prompt).await,
            Backend::Cli(cli) => cli.complete(prompt).await,
        }
    }

    async fn complete_with_tools(
        &self,
        prompt: &Prompt,
        tools: &dyn ToolExecutor,
    ) -> Result<String, SummarizeError> {
        match self {
            Backend::Api(api) => api.complete_with_tools(prompt, tools).await,
            Backend::Cli(cli) => cli.complete_with_tools(prompt, tools).await,
        }
    }
}

/// Short free-text summary of the report. Returns an empty string without
/// calling the backend when there is nothing to summarize.
#[instrument(skip_all, fields(user = %report.user))]
pub async fn prepare_ai_summary(
    summarizer: &dyn Summarizer,
    report: &ReportData,
    custom_prompt: Option<&str>,
) -> Result<String, SummarizeError> {
    let payload = summary_payload(&report.authored, &report.reviewed, &report.waiting);
    if payload.is_empty() {
        debug!("no PRs to summarize");
        return Ok(String::new());
    }

    let system = match custom_prompt {
        Some(custom) => custom.to_string(),
        None => format!("{SUMMARY_PROMPT}\n\n{SUMMARY_FORMAT}"),
    };
    let user = serde_json::to_string_pretty(&payload)?;
    debug!(chars = user.len(), "summary input");

    let text = summarizer.complete(&Prompt::new(system, user)).await?;
    let summary = text.trim().to_string();
    debug!(chars = summary.len(), "summary output");
    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::report::tests::sample;
    use crate::window::DateWindow;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted backend: pops one canned answer per call and records prompts.
    #[derive(Default)]
    pub struct FakeSummarizer {
        answers: Mutex<VecDeque<Result<String, SummarizeError>>>,
        pub prompts: Mutex<Vec<Prompt>>,
    }

    impl FakeSummarizer {
        pub fn new(answers: Vec<Result<String, SummarizeError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn prompt_at(&self, index: usize) -> Prompt {
            self.prompts.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Summarizer for FakeSummarizer {
        async fn complete(&self, prompt: &Prompt) -> Result<String, SummarizeError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(SummarizeError::EmptyResponse))
        }
    }

    fn report() -> ReportData {
        sample(DateWindow::single(chrono::NaiveDate::from_ymd_opt(2026, 2, 9).unwrap()))
    }

    #[tokio::test]
    async fn test_summary_trims_answer() {
        let fake = FakeSummarizer::new(vec![Ok("  Shipped the cache layer.\n".to_string())]);
        let summary = prepare_ai_summary(&fake, &report(), None).await.unwrap();
        assert_eq!(summary, "Shipped the cache layer.");

        let prompt = fake.prompt_at(0);
        assert!(prompt.system.contains("Max 200 characters"));
        let payload: serde_json::Value = serde_json::from_str(&prompt.user).unwrap();
        assert_eq!(payload["dashpay/platform"]["authored"][0]["number"], 2);
    }

    #[tokio::test]
    async fn test_custom_summary_prompt_replaces_default() {
        let fake = FakeSummarizer::new(vec![Ok("ok".to_string())]);
        prepare_ai_summary(&fake, &report(), Some("Be brief.")).await.unwrap();
        assert_eq!(fake.prompt_at(0).system, "Be brief.");
    }

    #[tokio::test]
    async fn test_empty_report_skips_backend() {
        let fake = FakeSummarizer::default();
        let mut empty = report();
        empty.authored.clear();
        empty.reviewed.clear();
        empty.waiting.clear();
        assert_eq!(prepare_ai_summary(&fake, &empty, None).await.unwrap(), "");
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_errors_propagate() {
        let fake = FakeSummarizer::new(vec![Err(SummarizeError::CliTimeout(180))]);
        let err = prepare_ai_summary(&fake, &report(), None).await.unwrap_err();
        assert!(matches!(err, SummarizeError::CliTimeout(180)));
    }

    #[test]
    fn test_backend_selection() {
        assert!(matches!(Backend::select("m", Some("sk-test".into())), Backend::Api(_)));
        assert!(matches!(Backend::select("m", Some(String::new())), Backend::Cli(_)));
        assert!(matches!(Backend::select("m", None), Backend::Cli(_)));
    }
}
