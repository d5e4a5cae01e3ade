//! Predictor and Explainer (SPEC_FULL §4.6): inline next-command suggestion
//! and short explanation, both LLM-backed and both designed to fail silent.
//!
//! JSON-response parsing follows the `serde_json::from_str` + graceful
//! fallback pattern in `providers/claude_code.rs::parse_task_result`.

use dashmap::DashMap;
use serde::Deserialize;

use crate::agent::provider::{Message, Provider, Role};
use crate::context::ContextBundle;

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    command: String,
}

/// Suggests an inline completion for the current buffer. Empty buffer
/// routes to the null-state predictor (context-only); non-empty buffer
/// routes to the prefix predictor (must extend the given prefix).
pub struct Predictor {
    provider: Box<dyn Provider>,
}

impl Predictor {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Returns an empty string on any failure — timeouts, malformed JSON,
    /// and transport errors must never surface to the user as errors
    /// (SPEC_FULL §4.6), only as a `debug!` log line.
    pub async fn suggest(&self, buffer: &str, context: &ContextBundle) -> String {
        let messages = if buffer.is_empty() {
            self.null_state_prompt(context)
        } else {
            self.prefix_prompt(buffer, context)
        };

        let deadline = tokio::time::timeout(
            crate::agent::provider::TimeoutTier::Fast.duration(),
            self.provider.complete(&messages, &[], None),
        )
        .await;

        match deadline {
            Ok(Ok(completion)) => match parse_prediction(&completion.content) {
                Some(command) if buffer.is_empty() || command.starts_with(buffer) => command,
                Some(_) => String::new(),
                None => String::new(),
            },
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "predictor request failed");
                String::new()
            }
            Err(_) => {
                tracing::debug!("predictor request timed out");
                String::new()
            }
        }
    }

    fn null_state_prompt(&self, context: &ContextBundle) -> Vec<Message> {
        vec![
            Message {
                role: Role::System,
                content: format!(
                    "Suggest the single most likely next shell command given this context. \
                     Respond as JSON: {{\"command\": \"...\"}}.\n\n{}",
                    context.render()
                ),
                tool_calls: None,
                tool_call_id: None,
            },
            Message {
                role: Role::User,
                content: "What command comes next?".to_string(),
                tool_calls: None,
                tool_call_id: None,
            },
        ]
    }

    fn prefix_prompt(&self, buffer: &str, context: &ContextBundle) -> Vec<Message> {
        vec![
            Message {
                role: Role::System,
                content: format!(
                    "Complete the shell command the user is typing, consistent with history \
                     and context. The completion must start with the given prefix verbatim. \
                     Respond as JSON: {{\"command\": \"...\"}}.\n\n{}",
                    context.render()
                ),
                tool_calls: None,
                tool_call_id: None,
            },
            Message {
                role: Role::User,
                content: format!("Prefix: {buffer}"),
                tool_calls: None,
                tool_call_id: None,
            },
        ]
    }
}

fn parse_prediction(content: &str) -> Option<String> {
    let trimmed = content.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```");
    serde_json::from_str::<PredictionResponse>(trimmed.trim())
        .ok()
        .map(|r| r.command)
}

/// Short human-readable explanation of a suggested command, cached per
/// suggestion string within a session. Concurrent map follows
/// `orchestrator/mod.rs`'s `Arc<DashMap<...>>` pattern: `explain` can be
/// called from several in-flight hint requests at once, each keyed by its
/// own suggestion string, so a single `Mutex<HashMap>` would serialize
/// lookups that never actually conflict.
pub struct Explainer {
    provider: Box<dyn Provider>,
    cache: DashMap<String, String>,
}

impl Explainer {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            provider,
            cache: DashMap::new(),
        }
    }

    pub async fn explain(&self, suggestion: &str) -> anyhow::Result<String> {
        if let Some(cached) = self.cache.get(suggestion) {
            return Ok(cached.clone());
        }

        let messages = vec![
            Message {
                role: Role::System,
                content: "Explain in one short sentence what this shell command does.".to_string(),
                tool_calls: None,
                tool_call_id: None,
            },
            Message {
                role: Role::User,
                content: suggestion.to_string(),
                tool_calls: None,
                tool_call_id: None,
            },
        ];

        let completion = self.provider.complete(&messages, &[], None).await?;
        let explanation = completion.content.trim().to_string();
        self.cache.insert(suggestion.to_string(), explanation.clone());
        Ok(explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::provider::{Completion, StaticProvider};

    fn bundle() -> ContextBundle {
        ContextBundle::default()
    }

    #[tokio::test]
    async fn suggest_returns_parsed_command_for_empty_buffer() {
        let provider = StaticProvider::new(
            "test-model",
            vec![Completion {
                content: r#"{"command": "git status"}"#.to_string(),
                tool_calls: Vec::new(),
                prompt_tokens: 0,
                completion_tokens: 0,
            }],
        );
        let predictor = Predictor::new(Box::new(provider));
        let suggestion = predictor.suggest("", &bundle()).await;
        assert_eq!(suggestion, "git status");
    }

    #[tokio::test]
    async fn suggest_rejects_completion_not_extending_prefix() {
        let provider = StaticProvider::new(
            "test-model",
            vec![Completion {
                content: r#"{"command": "ls -la"}"#.to_string(),
                tool_calls: Vec::new(),
                prompt_tokens: 0,
                completion_tokens: 0,
            }],
        );
        let predictor = Predictor::new(Box::new(provider));
        let suggestion = predictor.suggest("git ", &bundle()).await;
        assert_eq!(suggestion, "");
    }

    #[tokio::test]
    async fn suggest_is_empty_on_malformed_json() {
        let provider = StaticProvider::new(
            "test-model",
            vec![Completion {
                content: "not json at all".to_string(),
                tool_calls: Vec::new(),
                prompt_tokens: 0,
                completion_tokens: 0,
            }],
        );
        let predictor = Predictor::new(Box::new(provider));
        let suggestion = predictor.suggest("", &bundle()).await;
        assert_eq!(suggestion, "");
    }

    #[tokio::test]
    async fn suggest_is_empty_when_provider_errors() {
        let provider = StaticProvider::new("test-model", Vec::new());
        let predictor = Predictor::new(Box::new(provider));
        let suggestion = predictor.suggest("", &bundle()).await;
        assert_eq!(suggestion, "");
    }

    #[tokio::test]
    async fn explain_caches_by_suggestion_string() {
        let provider = StaticProvider::new(
            "test-model",
            vec![Completion {
                content: "Lists files in long format.".to_string(),
                tool_calls: Vec::new(),
                prompt_tokens: 0,
                completion_tokens: 0,
            }],
        );
        let explainer = Explainer::new(Box::new(provider));
        let first = explainer.explain("ls -la").await.unwrap();
        let second = explainer.explain("ls -la").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "Lists files in long format.");
    }
}
