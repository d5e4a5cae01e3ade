//! LLM backend transport (SPEC_FULL §4.3: "the agent sends requests through
//! a `Provider` trait ... HTTP-backed providers use `reqwest`"), grounded on
//! `providers/codex.rs`'s OpenAI-shaped request/response structs and header
//! setup, generalised from a task-execution provider to a plain chat-message
//! completion provider since Task/TaskResult/AgentIdentity are ccswarm
//! orchestration concepts this spec does not carry.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

/// One message in an Agent Session conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The model's reply to one `complete` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Timeout tier selection (SPEC_FULL §5): fast/slow/streaming calls get
/// different budgets.
#[derive(Debug, Clone, Copy)]
pub enum TimeoutTier {
    Fast,
    Slow,
    Streaming,
}

impl TimeoutTier {
    pub fn duration(self) -> Duration {
        match self {
            TimeoutTier::Fast => Duration::from_secs(15),
            TimeoutTier::Slow => Duration::from_secs(30),
            TimeoutTier::Streaming => Duration::from_secs(60),
        }
    }
}

/// Backend abstraction the Agent Session talks to; one implementation per
/// provider (OpenAI-compatible HTTP, a static test double, etc).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send the full conversation plus available tool definitions and
    /// return the assistant's reply in one shot. `model_override`, when
    /// set, is used in place of the provider's configured model for this
    /// call only (SPEC_FULL §4.4, subagent `model` field).
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        model_override: Option<&str>,
    ) -> Result<Completion>;

    /// Human-readable model identifier, used in `print_token_stats` output.
    fn model(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout: TimeoutTier,
}

/// OpenAI-compatible chat-completions backend.
pub struct HttpProvider {
    config: HttpProviderConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: &'a [serde_json::Value],
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "default_tool_call_type")]
    kind: String,
    function: WireFunctionCall,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    error: ChatErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetails {
    message: String,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .context("invalid API key header value")?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout.duration())
            .build()
            .context("build HTTP client")?;
        Ok(Self { config, client })
    }

    fn api_base(&self) -> &str {
        self.config
            .api_base
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
        model_override: Option<&str>,
    ) -> Result<Completion> {
        let wire: Vec<WireMessage> = messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::System => "system".to_string(),
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                    Role::Tool => "tool".to_string(),
                },
                content: m.content.clone(),
                tool_calls: m.tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|c| WireToolCall {
                            id: c.id.clone(),
                            kind: default_tool_call_type(),
                            function: WireFunctionCall {
                                name: c.name.clone(),
                                arguments: c.arguments.to_string(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect();

        let request = ChatRequest {
            model: model_override.unwrap_or(&self.config.model),
            messages: wire,
            tools,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.api_base());
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("send chat completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ChatError>(&text) {
                anyhow::bail!("provider error ({status}): {}", err.error.message);
            }
            anyhow::bail!("provider error ({status}): {text}");
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("parse chat completion response")?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .context("provider returned no choices")?;
        let (prompt_tokens, completion_tokens) = body
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                // Every OpenAI-compatible backend assigns an id; a fallback
                // guards the rare provider that omits one, the same
                // generate-on-missing pattern `providers/codex.rs` uses for
                // its own task/session ids.
                id: if call.id.is_empty() { uuid::Uuid::new_v4().to_string() } else { call.id },
                name: call.function.name,
                arguments: serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null),
            })
            .collect();

        Ok(Completion {
            content: choice.message.content,
            tool_calls,
            prompt_tokens,
            completion_tokens,
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// A deterministic, network-free provider for tests and `-c`/non-interactive
/// smoke runs: answers in FIFO order from a preloaded queue of completions.
pub struct StaticProvider {
    model: String,
    queue: std::sync::Mutex<std::collections::VecDeque<Completion>>,
}

impl StaticProvider {
    pub fn new(model: impl Into<String>, replies: Vec<Completion>) -> Self {
        Self {
            model: model.into(),
            queue: std::sync::Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl Provider for StaticProvider {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[serde_json::Value],
        _model_override: Option<&str>,
    ) -> Result<Completion> {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .context("StaticProvider queue exhausted")
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(text: &str) -> Completion {
        Completion {
            content: text.to_string(),
            tool_calls: Vec::new(),
            prompt_tokens: 1,
            completion_tokens: 1,
        }
    }

    #[tokio::test]
    async fn static_provider_replies_in_fifo_order() {
        let provider = StaticProvider::new("test-model", vec![completion("one"), completion("two")]);
        let first = provider.complete(&[], &[], None).await.unwrap();
        assert_eq!(first.content, "one");
        let second = provider.complete(&[], &[], None).await.unwrap();
        assert_eq!(second.content, "two");
    }

    #[tokio::test]
    async fn static_provider_errors_when_exhausted() {
        let provider = StaticProvider::new("test-model", vec![]);
        assert!(provider.complete(&[], &[], None).await.is_err());
    }

    #[test]
    fn timeout_tiers_match_spec_defaults() {
        assert_eq!(TimeoutTier::Fast.duration(), Duration::from_secs(15));
        assert_eq!(TimeoutTier::Slow.duration(), Duration::from_secs(30));
        assert_eq!(TimeoutTier::Streaming.duration(), Duration::from_secs(60));
    }

    #[test]
    fn http_provider_defaults_api_base_to_openai() {
        let provider = HttpProvider::new(HttpProviderConfig {
            api_key: "key".to_string(),
            model: "gpt-4".to_string(),
            api_base: None,
            max_tokens: None,
            temperature: None,
            timeout: TimeoutTier::Fast,
        })
        .unwrap();
        assert_eq!(provider.api_base(), "https://api.openai.com/v1");
    }
}
