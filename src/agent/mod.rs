//! Agent Session: a multi-turn LLM conversation with tool-calling,
//! context-window pruning, and per-turn context injection (SPEC_FULL §4.3).

pub mod provider;
pub mod tools;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::context::ContextProvider;
use provider::{Completion, Message, Provider, Role, ToolCall};
use tools::{ToolEnvironment, ToolRegistry, ToolResult};

/// Rough token estimate (~4 characters per token), the same approximation
/// `session::context_bridge::ContextBridge::estimate_tokens` uses — this
/// crate carries no tokenizer dependency, only a pruning heuristic.
fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

fn message_tokens(message: &Message) -> usize {
    estimate_tokens(&message.content)
        + message
            .tool_calls
            .as_ref()
            .map(|calls| calls.iter().map(|c| estimate_tokens(&c.arguments.to_string())).sum())
            .unwrap_or(0)
}

/// Prune a post-system message list to fit `budget` tokens: keep two-thirds
/// of the budget for the most recent tail and one-third for the earliest
/// prefix, discarding the middle (SPEC_FULL §4.3). Never splits a tool-call
/// message from its tool-response replies.
pub fn prune_conversation(messages: &[Message], budget: usize) -> Vec<Message> {
    if messages.is_empty() || budget == 0 {
        return Vec::new();
    }

    let tail_budget = budget * 2 / 3;
    let prefix_budget = budget - tail_budget;

    let tail_start = extend_to_group_boundary(messages, take_from_end(messages, tail_budget));
    let prefix_end = extend_to_group_boundary(messages, take_from_start(messages, prefix_budget)).min(tail_start);

    let mut kept: Vec<Message> = messages[..prefix_end].to_vec();
    kept.extend_from_slice(&messages[tail_start..]);
    kept
}

/// Index (exclusive) of how many leading messages fit in `budget` tokens.
fn take_from_start(messages: &[Message], budget: usize) -> usize {
    let mut used = 0;
    let mut count = 0;
    for message in messages {
        let cost = message_tokens(message);
        if used + cost > budget {
            break;
        }
        used += cost;
        count += 1;
    }
    count
}

/// Index (inclusive start) of the trailing run of messages that fits in
/// `budget` tokens.
fn take_from_end(messages: &[Message], budget: usize) -> usize {
    let mut used = 0;
    let mut start = messages.len();
    for message in messages.iter().rev() {
        let cost = message_tokens(message);
        if used + cost > budget {
            break;
        }
        used += cost;
        start -= 1;
    }
    start
}

/// If `index` would split a tool-call message from its tool-response
/// replies, move it backward (for a tail start) to the start of that group.
/// Used symmetrically for both boundaries since a group always reads
/// assistant-tool-call followed by one-or-more tool-response messages.
fn extend_to_group_boundary(messages: &[Message], index: usize) -> usize {
    let mut i = index;
    while i > 0 && i < messages.len() && messages[i].role == Role::Tool {
        i -= 1;
    }
    i
}

/// Holds the conversation, tool registry, context provider, and configured
/// token budget for one Agent Session.
pub struct AgentSession {
    provider: Arc<dyn Provider>,
    context: Arc<ContextProvider>,
    tools: Arc<ToolRegistry>,
    environment: Arc<ToolEnvironment>,
    conversation: Mutex<Vec<Message>>,
    token_budget: usize,
    total_prompt_tokens: Mutex<u64>,
    total_completion_tokens: Mutex<u64>,
}

impl AgentSession {
    pub fn new(
        provider: Arc<dyn Provider>,
        context: Arc<ContextProvider>,
        tools: Arc<ToolRegistry>,
        environment: Arc<ToolEnvironment>,
        token_budget: usize,
    ) -> Self {
        Self {
            provider,
            context,
            tools,
            environment,
            conversation: Mutex::new(Vec::new()),
            token_budget,
            total_prompt_tokens: Mutex::new(0),
            total_completion_tokens: Mutex::new(0),
        }
    }

    /// Collaborator handles shared with a [`crate::subagent::executor::SubagentExecutor`],
    /// which needs its own provider/context/tools/environment references to
    /// run an independently-authorised conversation (SPEC_FULL §4.4).
    pub fn provider(&self) -> Arc<dyn Provider> {
        self.provider.clone()
    }

    pub fn context(&self) -> Arc<ContextProvider> {
        self.context.clone()
    }

    pub fn tools(&self) -> Arc<ToolRegistry> {
        self.tools.clone()
    }

    pub fn environment(&self) -> Arc<ToolEnvironment> {
        self.environment.clone()
    }

    fn tool_schemas(&self) -> Vec<serde_json::Value> {
        self.tools
            .definitions()
            .iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.name,
                    "description": d.description,
                    "input_schema": d.input_schema,
                })
            })
            .collect()
    }

    /// Append a user turn, run the tool-calling loop until the assistant
    /// stops requesting tools, and return every assistant text chunk
    /// produced along the way.
    pub async fn chat(&self, prompt: &str) -> Result<Vec<String>> {
        let bundle = self.context.get_context().await;
        let system_prompt = bundle.render();

        let mut conversation = self.conversation.lock().await;
        if conversation.is_empty() || conversation[0].role != Role::System {
            conversation.insert(
                0,
                Message {
                    role: Role::System,
                    content: system_prompt.clone(),
                    tool_calls: None,
                    tool_call_id: None,
                },
            );
        } else {
            conversation[0].content = system_prompt;
        }
        conversation.push(Message {
            role: Role::User,
            content: prompt.to_string(),
            tool_calls: None,
            tool_call_id: None,
        });

        let mut chunks = Vec::new();
        loop {
            let pruned = {
                let system = conversation[0].clone();
                let mut pruned = vec![system];
                pruned.extend(prune_conversation(&conversation[1..], self.token_budget));
                pruned
            };

            let completion: Completion = match self
                .provider
                .complete(&pruned, &self.tool_schemas(), None)
                .await
            {
                Ok(c) => c,
                Err(err) => {
                    chunks.push(format!("interrupted: {err}"));
                    break;
                }
            };

            *self.total_prompt_tokens.lock().await += completion.prompt_tokens as u64;
            *self.total_completion_tokens.lock().await += completion.completion_tokens as u64;

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
                let response = self.run_tool_call(call).await;
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

    async fn run_tool_call(&self, call: &ToolCall) -> String {
        match self
            .tools
            .call(&call.name, self.environment.clone(), call.arguments.clone())
            .await
        {
            Ok(result) => result.wrapped_error(),
            Err(err) => ToolResult::error(err.to_string()).wrapped_error(),
        }
    }

    /// Drop all non-system messages and re-seed the system prompt from
    /// current context on the next `chat` call.
    pub async fn reset_chat(&self) {
        let mut conversation = self.conversation.lock().await;
        conversation.clear();
    }

    /// Emit a summary of observed token usage to stdout.
    pub async fn print_token_stats(&self) {
        let prompt = *self.total_prompt_tokens.lock().await;
        let completion = *self.total_completion_tokens.lock().await;
        println!(
            "model={} prompt_tokens={} completion_tokens={} total_tokens={}",
            self.provider.model(),
            prompt,
            completion,
            prompt + completion
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn prune_keeps_everything_when_budget_is_generous() {
        let messages = vec![msg(Role::User, "a"), msg(Role::Assistant, "b")];
        let pruned = prune_conversation(&messages, 1000);
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn prune_drops_middle_and_keeps_prefix_and_tail() {
        let messages: Vec<Message> = (0..20)
            .map(|i| msg(Role::User, &"x".repeat(40 + i)))
            .collect();
        let pruned = prune_conversation(&messages, 200);
        assert!(pruned.len() < messages.len());
        assert_eq!(pruned.first().unwrap().content, messages[0].content);
        assert_eq!(pruned.last().unwrap().content, messages.last().unwrap().content);
    }

    #[test]
    fn prune_never_orphans_a_tool_response_from_its_call() {
        let messages = vec![
            msg(Role::User, &"x".repeat(200)),
            msg(Role::Assistant, "calling tool"),
            msg(Role::Tool, "tool result"),
            msg(Role::User, "thanks"),
        ];
        let pruned = prune_conversation(&messages, 5);
        assert!(
            pruned.iter().all(|m| m.role != Role::Tool)
                || pruned.iter().any(|m| m.role == Role::Assistant)
        );
    }

    #[test]
    fn prune_returns_empty_for_zero_budget() {
        let messages = vec![msg(Role::User, "a")];
        assert!(prune_conversation(&messages, 0).is_empty());
    }

    #[tokio::test]
    async fn chat_executes_tool_calls_and_appends_wrapped_errors() {
        use provider::{HttpProviderConfig, StaticProvider, TimeoutTier};
        let _ = HttpProviderConfig {
            api_key: String::new(),
            model: String::new(),
            api_base: None,
            max_tokens: None,
            temperature: None,
            timeout: TimeoutTier::Fast,
        };

        let first = Completion {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "1".to_string(),
                name: "nonexistent_tool".to_string(),
                arguments: serde_json::json!({}),
            }],
            prompt_tokens: 5,
            completion_tokens: 5,
        };
        let second = Completion {
            content: "done".to_string(),
            tool_calls: Vec::new(),
            prompt_tokens: 3,
            completion_tokens: 2,
        };
        let provider: Arc<dyn Provider> = Arc::new(StaticProvider::new("test-model", vec![first, second]));
        let context = Arc::new(ContextProvider::new(Vec::new()));
        let tools = Arc::new(ToolRegistry::default_registry());
        let environment = Arc::new(ToolEnvironment {
            cwd: std::env::current_dir().unwrap(),
            interpreter: Arc::new(crate::interpreter::ShellOutInterpreter::default()),
        });
        let session = AgentSession::new(provider, context, tools, environment, 10_000);

        let chunks = session.chat("do something").await.unwrap();
        assert_eq!(chunks, vec!["done".to_string()]);

        let conversation = session.conversation.lock().await;
        assert!(conversation
            .iter()
            .any(|m| m.role == Role::Tool && m.content.contains("gsh_tool_call_error")));
    }

    #[tokio::test]
    async fn reset_chat_clears_conversation() {
        use provider::StaticProvider;
        let provider: Arc<dyn Provider> = Arc::new(StaticProvider::new(
            "test-model",
            vec![Completion {
                content: "hi".to_string(),
                tool_calls: Vec::new(),
                prompt_tokens: 1,
                completion_tokens: 1,
            }],
        ));
        let context = Arc::new(ContextProvider::new(Vec::new()));
        let tools = Arc::new(ToolRegistry::default_registry());
        let environment = Arc::new(ToolEnvironment {
            cwd: std::env::current_dir().unwrap(),
            interpreter: Arc::new(crate::interpreter::ShellOutInterpreter::default()),
        });
        let session = AgentSession::new(provider, context, tools, environment, 10_000);
        session.chat("hello").await.unwrap();
        assert!(!session.conversation.lock().await.is_empty());
        session.reset_chat().await;
        assert!(session.conversation.lock().await.is_empty());
    }
}
