use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{Prompt, SummarizeError, Summarizer};

const CLI_TIMEOUT: Duration = Duration::from_secs(180);

/// Claude through the `claude` command-line tool in print mode. The system
/// instruction and payload are sent together on stdin.
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: String,
    model: String,
    timeout: Duration,
}

impl CliBackend {
    pub fn new(model: &str) -> Self {
        Self {
            program: "claude".to_string(),
            model: model.to_string(),
            timeout: CLI_TIMEOUT,
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-p".to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--output-format".to_string(),
            "text".to_string(),
        ]
    }
}

/// The single stdin message: system instruction, blank line, payload.
pub fn combined_prompt(prompt: &Prompt) -> String {
    format!("{}\n\n{}", prompt.system, prompt.user)
}

#[async_trait]
impl Summarizer for CliBackend {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, prompt: &Prompt) -> Result<String, SummarizeError> {
        let input = combined_prompt(prompt);
        debug!(chars = input.len(), "calling claude CLI");

        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SummarizeError::CliNotFound,
                _ => SummarizeError::Io(e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let written = match stdin.write_all(input.as_bytes()).await {
                Ok(()) => stdin.shutdown().await,
                Err(e) => Err(e),
            };
            // a child that exits early is reported through its status below
            if let Err(e) = written {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(SummarizeError::CliTimeout(self.timeout.as_secs())),
        };

        if !output.status.success() {
            return Err(SummarizeError::CliFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr)
                    .trim()
                    .chars()
                    .take(500)
                    .collect(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(SummarizeError::EmptyResponse);
        }
        debug!(chars = text.len(), "claude CLI response");
        Ok(text)
    }
}
