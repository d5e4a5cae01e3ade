//! Authorised subagent chat execution (SPEC_FULL §4.4 Execution), grounded
//! on `identity/boundary.rs`'s regex-based `TaskBoundaryChecker` pattern
//! generalised from task-routing to per-tool-call access control.

use std::sync::Arc;

use regex::Regex;

use crate::agent::provider::{Message, Provider, Role, ToolCall};
use crate::agent::tools::{ToolEnvironment, ToolRegistry, ToolResult};
use crate::context::ContextProvider;

use super::SubagentDefinition;

/// Checks a tool call against one Subagent Definition's allowed-tools set
/// and optional `fileRegex` restriction.
pub struct SubagentAuthorizer {
    allowed_tools: Vec<String>,
    file_regex: Option<Regex>,
}

impl SubagentAuthorizer {
    pub fn new(definition: &SubagentDefinition) -> Self {
        Self {
            allowed_tools: definition.allowed_tools.clone(),
            file_regex: definition.file_regex.as_deref().and_then(|p| Regex::new(p).ok()),
        }
    }

    /// `Ok(())` if the call is authorized, `Err(message)` with a user-facing
    /// denial message otherwise. Denials are never fatal to the conversation.
    pub fn authorize(&self, tool_name: &str, arguments: &serde_json::Value) -> Result<(), String> {
        if !self.allowed_tools.iter().any(|t| t == tool_name) {
            return Err(format!("Tool '{tool_name}' is not available for this subagent"));
        }

        if let Some(regex) = &self.file_regex {
            if let Some(path) = arguments.get("path").and_then(|v| v.as_str()) {
                if !regex.is_match(path) {
                    return Err(format!("File '{path}' is outside this subagent's allowed scope"));
                }
            }
        }

        Ok(())
    }
}

fn system_prompt_for(definition: &SubagentDefinition) -> String {
    let mut prompt = format!("You are the '{}' subagent.\n\n{}", definition.name, definition.system_prompt);
    prompt.push_str("\n\nAllowed tools: ");
    prompt.push_str(&definition.allowed_tools.join(", "));
    if let Some(regex) = &definition.file_regex {
        prompt.push_str(&format!("\nFile access is restricted to paths matching: {regex}"));
    }
    prompt
}

/// Runs one subagent chat turn: shares `AgentSession`'s conversational
/// mechanics (SPEC_FULL §4.3) but routes every tool call through
/// [`SubagentAuthorizer`] first.
pub struct SubagentExecutor {
    definition: SubagentDefinition,
    authorizer: SubagentAuthorizer,
    provider: Arc<dyn Provider>,
    context: Arc<ContextProvider>,
    tools: Arc<ToolRegistry>,
    environment: Arc<ToolEnvironment>,
}

impl SubagentExecutor {
    pub fn new(
        definition: SubagentDefinition,
        provider: Arc<dyn Provider>,
        context: Arc<ContextProvider>,
        tools: Arc<ToolRegistry>,
        environment: Arc<ToolEnvironment>,
    ) -> Self {
        let authorizer = SubagentAuthorizer::new(&definition);
        Self {
            definition,
            authorizer,
            provider,
            context,
            tools,
            environment,
        }
    }

    pub async fn chat(&self, prompt: &str) -> anyhow::Result<Vec<String>> {
        let bundle = self.context.get_context().await;
        let mut conversation = vec![
            Message {
                role: Role::System,
                content: format!("{}\n\n{}", system_prompt_for(&self.definition), bundle.render()),
                tool_calls: None,
                tool_call_id: None,
            },
            Message {
                role: Role::User,
                content: prompt.to_string(),
                tool_calls: None,
                tool_call_id: None,
            },
        ];

        let mut chunks = Vec::new();
        loop {
            let completion = self
                .provider
                .complete(&conversation, &[], self.definition.model.as_deref())
                .await?;
            if !completion.content.is_empty() {
                chunks.push(completion.content.clone());
            }
            conversation.push(Message {
                role: Role::Assistant,
                content: completion.content,
                tool_calls: if completion.tool_calls.is_empty() {
                    None
                } else {
                    Some(completion.tool_calls.clone())
                },
                tool_call_id: None,
            });

            if completion.tool_calls.is_empty() {
                break;
            }

            for call in &completion.tool_calls {
                let response = self.run_authorized_call(call).await;
                conversation.push(Message {
                    role: Role::Tool,
                    content: response,
                    tool_calls: None,
                    tool_call_id: Some(call.id.clone()),
                });
            }
        }

        Ok(chunks)
    }

    async fn run_authorized_call(&self, call: &ToolCall) -> String {
        if let Err(denial) = self.authorizer.authorize(&call.name, &call.arguments) {
            return ToolResult::error(denial).wrapped_error();
        }
        match self
            .tools
            .call(&call.name, self.environment.clone(), call.arguments.clone())
            .await
        {
            Ok(result) => result.wrapped_error(),
            Err(err) => ToolResult::error(err.to_string()).wrapped_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subagent::Dialect;

    fn reviewer() -> SubagentDefinition {
        SubagentDefinition {
            id: "reviewer".to_string(),
            name: "Reviewer".to_string(),
            description: String::new(),
            dialect: Dialect::Claude,
            system_prompt: "review diffs".to_string(),
            allowed_tools: vec!["view_file".to_string()],
            file_regex: Some(r"^src/.*\.go$".to_string()),
            model: None,
        }
    }

    #[test]
    fn denies_tool_outside_allowed_set() {
        let authorizer = SubagentAuthorizer::new(&reviewer());
        let result = authorizer.authorize("bash", &serde_json::json!({ "command": "ls" }));
        assert_eq!(
            result.unwrap_err(),
            "Tool 'bash' is not available for this subagent"
        );
    }

    #[test]
    fn denies_file_outside_regex_scope() {
        let authorizer = SubagentAuthorizer::new(&reviewer());
        let result = authorizer.authorize("view_file", &serde_json::json!({ "path": "docs/readme.md" }));
        assert!(result.is_err());
    }

    #[test]
    fn allows_matching_tool_and_path() {
        let authorizer = SubagentAuthorizer::new(&reviewer());
        let result = authorizer.authorize("view_file", &serde_json::json!({ "path": "src/main.go" }));
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn chat_wraps_denied_tool_call_without_ending_conversation() {
        use crate::agent::provider::{Completion, StaticProvider};

        let first = Completion {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "1".to_string(),
                name: "bash".to_string(),
                arguments: serde_json::json!({ "command": "rm -rf /" }),
            }],
            prompt_tokens: 1,
            completion_tokens: 1,
        };
        let second = Completion {
            content: "understood, staying read-only".to_string(),
            tool_calls: Vec::new(),
            prompt_tokens: 1,
            completion_tokens: 1,
        };
        let provider: Arc<dyn Provider> = Arc::new(StaticProvider::new("test-model", vec![first, second]));
        let context = Arc::new(ContextProvider::new(Vec::new()));
        let tools = Arc::new(ToolRegistry::default_registry());
        let environment = Arc::new(ToolEnvironment {
            cwd: std::env::current_dir().unwrap(),
            interpreter: Arc::new(crate::interpreter::ShellOutInterpreter::default()),
        });
        let executor = SubagentExecutor::new(reviewer(), provider, context, tools, environment);

        let chunks = executor.chat("check this file").await.unwrap();
        assert_eq!(chunks, vec!["understood, staying read-only".to_string()]);
    }

    /// Records the `model_override` it was called with, so tests can assert
    /// a subagent's `model` field actually reaches the provider call.
    struct RecordingProvider {
        seen_model: std::sync::Mutex<Option<String>>,
        reply: Completion,
    }

    #[async_trait::async_trait]
    impl Provider for RecordingProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[serde_json::Value],
            model_override: Option<&str>,
        ) -> anyhow::Result<Completion> {
            *self.seen_model.lock().unwrap() = model_override.map(str::to_string);
            Ok(self.reply.clone())
        }

        fn model(&self) -> &str {
            "base-model"
        }
    }

    #[tokio::test]
    async fn chat_applies_subagent_model_override() {
        use crate::agent::provider::Completion;

        let mut definition = reviewer();
        definition.model = Some("gpt-4o-mini".to_string());

        let provider = Arc::new(RecordingProvider {
            seen_model: std::sync::Mutex::new(None),
            reply: Completion {
                content: "done".to_string(),
                tool_calls: Vec::new(),
                prompt_tokens: 1,
                completion_tokens: 1,
            },
        });
        let context = Arc::new(ContextProvider::new(Vec::new()));
        let tools = Arc::new(ToolRegistry::default_registry());
        let environment = Arc::new(ToolEnvironment {
            cwd: std::env::current_dir().unwrap(),
            interpreter: Arc::new(crate::interpreter::ShellOutInterpreter::default()),
        });
        let executor = SubagentExecutor::new(definition, provider.clone(), context, tools, environment);

        executor.chat("review this").await.unwrap();
        assert_eq!(provider.seen_model.lock().unwrap().as_deref(), Some("gpt-4o-mini"));
    }
}
