use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::tools::ToolExecutor;
use super::{Prompt, SummarizeError, Summarizer};

const MESSAGES_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
pub const MAX_TOOL_TURNS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Sends one Messages API request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse, SummarizeError>;
}

/// HTTPS transport authenticated with an API key.
pub struct HttpTransport {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: MESSAGES_ENDPOINT.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse, SummarizeError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(std::time::Duration::from_secs(120))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SummarizeError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Claude over the Messages API, with a bounded tool-use loop.
pub struct AnthropicBackend {
    model: String,
    transport: Box<dyn Transport>,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, model: &str) -> Self {
        Self::with_transport(model, Box::new(HttpTransport::new(api_key)))
    }

    pub fn with_transport(model: &str, transport: Box<dyn Transport>) -> Self {
        Self {
            model: model.to_string(),
            transport,
        }
    }

    fn request(&self, prompt: &Prompt, messages: Vec<Message>, tools: Vec<Value>) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: prompt.system.clone(),
            messages,
            tools,
        }
    }
}

#[async_trait]
impl Summarizer for AnthropicBackend {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, prompt: &Prompt) -> Result<String, SummarizeError> {
        let messages = vec![Message {
            role: "user",
            content: Value::String(prompt.user.clone()),
        }];
        let response = self
            .transport
            .send(&self.request(prompt, messages, Vec::new()))
            .await?;
        debug!(
            stop = ?response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Claude API response"
        );
        Ok(response.text())
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete_with_tools(
        &self,
        prompt: &Prompt,
        tools: &dyn ToolExecutor,
    ) -> Result<String, SummarizeError> {
        let descriptors = tools.descriptors();
        let mut messages = vec![Message {
            role: "user",
            content: Value::String(prompt.user.clone()),
        }];

        for turn in 1..=MAX_TOOL_TURNS {
            let request = self.request(prompt, messages.clone(), descriptors.clone());
            let response = self.transport.send(&request).await?;
            debug!(
                turn,
                stop = ?response.stop_reason,
                blocks = response.content.len(),
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "tool conversation turn"
            );

            if response.stop_reason.as_deref() == Some("end_turn") {
                return Ok(response.text());
            }

            let mut results = Vec::new();
            for block in &response.content {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    let output = tools.execute(name, input).await;
                    results.push(json!({
                        "type": "tool_result",
                        "tool_use_id": id,
                        "content": output
                    }));
                }
            }
            if results.is_empty() {
                return Ok(response.text());
            }

            let echoed: Vec<&ContentBlock> = response
                .content
                .iter()
                .filter(|block| !matches!(block, ContentBlock::Other))
                .collect();
            messages.push(Message {
                role: "assistant",
                content: serde_json::to_value(echoed)?,
            });
            messages.push(Message {
                role: "user",
                content: Value::Array(results),
            });
        }

        Err(SummarizeError::TurnLimit(MAX_TOOL_TURNS))
    }
}
