//! The five-tool universe shared by the default Agent and every Subagent
//! (SPEC_FULL §4.3, §4.4), modelled on `ai-session::mcp::tools::ToolRegistry`
//! but generalised from a closure-only handler map to handlers that receive
//! an explicit [`ToolEnvironment`] (the "Global runner handle" design note,
//! SPEC_FULL §9) rather than reaching into process-wide state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::{json, Value};

use crate::interpreter::Interpreter;

/// Every tool name the system knows about.
pub const ALL_TOOL_NAMES: [&str; 5] = [
    "bash",
    "view_file",
    "view_directory",
    "create_file",
    "edit_file",
];

/// A JSON-schema-described tool definition, mirroring the MCP tool shape.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    /// Wrap an error for injection into the conversation as a tool response
    /// (SPEC_FULL §4.3 error handling).
    pub fn wrapped_error(&self) -> String {
        if self.is_error {
            format!("<gsh_tool_call_error>{}</gsh_tool_call_error>", self.text)
        } else {
            self.text.clone()
        }
    }
}

/// Execution context handed to every tool handler: the working directory and
/// a handle to the embedded interpreter, replacing the teacher's process-wide
/// mutable runner pointer.
pub struct ToolEnvironment {
    pub cwd: PathBuf,
    pub interpreter: Arc<dyn Interpreter>,
}

/// A registered tool's callable implementation.
pub type ToolHandler =
    Arc<dyn Fn(Arc<ToolEnvironment>, Value) -> BoxFuture<'static, Result<ToolResult>> + Send + Sync>;

/// Registry mapping tool name to definition + handler.
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, def: ToolDefinition, handler: F)
    where
        F: Fn(Arc<ToolEnvironment>, Value) -> BoxFuture<'static, Result<ToolResult>>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(def.name.clone(), Arc::new(handler));
        self.definitions.push(def);
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandler> {
        self.handlers.get(name)
    }

    pub async fn call(
        &self,
        name: &str,
        env: Arc<ToolEnvironment>,
        args: Value,
    ) -> Result<ToolResult> {
        match self.get(name) {
            Some(handler) => handler(env, args).await,
            None => anyhow::bail!("unknown tool '{name}'"),
        }
    }

    /// Build the default five-tool registry (bash + file tools).
    pub fn default_registry() -> Self {
        let mut registry = Self::new();

        registry.register(
            ToolDefinition {
                name: "bash".to_string(),
                description: "Execute a shell command".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "command": { "type": "string" } },
                    "required": ["command"],
                }),
            },
            |env, args| Box::pin(run_bash(env, args)),
        );

        registry.register(
            ToolDefinition {
                name: "view_file".to_string(),
                description: "Read a file's contents".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"],
                }),
            },
            |env, args| Box::pin(async move {
                let path = required_path(&env.cwd, &args)?;
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| anyhow::anyhow!("read {}: {}", path.display(), e))?;
                Ok(ToolResult::ok(content))
            }),
        );

        registry.register(
            ToolDefinition {
                name: "view_directory".to_string(),
                description: "List a directory's entries".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"],
                }),
            },
            |env, args| Box::pin(async move {
                let path = required_path(&env.cwd, &args)?;
                let mut names = Vec::new();
                let mut dir = tokio::fs::read_dir(&path)
                    .await
                    .map_err(|e| anyhow::anyhow!("list {}: {}", path.display(), e))?;
                while let Some(entry) = dir.next_entry().await? {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
                names.sort();
                Ok(ToolResult::ok(names.join("\n")))
            }),
        );

        registry.register(
            ToolDefinition {
                name: "create_file".to_string(),
                description: "Create a new file with the given content".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" },
                    },
                    "required": ["path", "content"],
                }),
            },
            |env, args| Box::pin(async move {
                let path = required_path(&env.cwd, &args)?;
                let content = args.get("content").and_then(Value::as_str).unwrap_or("");
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, content)
                    .await
                    .map_err(|e| anyhow::anyhow!("write {}: {}", path.display(), e))?;
                Ok(ToolResult::ok(format!("created {}", path.display())))
            }),
        );

        registry.register(
            ToolDefinition {
                name: "edit_file".to_string(),
                description: "Replace an exact substring within a file".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "find": { "type": "string" },
                        "replace": { "type": "string" },
                    },
                    "required": ["path", "find", "replace"],
                }),
            },
            |env, args| Box::pin(async move {
                let path = required_path(&env.cwd, &args)?;
                let find = args
                    .get("find")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow::anyhow!("missing 'find' argument"))?
                    .to_string();
                let replace = args.get("replace").and_then(Value::as_str).unwrap_or("").to_string();
                let original = tokio::fs::read_to_string(&path).await?;
                if !original.contains(&find) {
                    anyhow::bail!("'{}' not found in {}", find, path.display());
                }
                tokio::fs::write(&path, original.replacen(&find, &replace, 1)).await?;
                Ok(ToolResult::ok(format!("edited {}", path.display())))
            }),
        );

        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::default_registry()
    }
}

async fn run_bash(env: Arc<ToolEnvironment>, args: Value) -> Result<ToolResult> {
    let command = args
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing 'command' argument"))?;
    let statement = env
        .interpreter
        .parse(command)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let outcome = env
        .interpreter
        .execute(&statement, &env.cwd, &mut |_| {})
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let mut text = String::from_utf8_lossy(&outcome.stdout).into_owned();
    if outcome.exit_code != 0 {
        text.push_str(&format!("\n[exit code {}]", outcome.exit_code));
        return Ok(ToolResult::error(text));
    }
    Ok(ToolResult::ok(text))
}

fn required_path(cwd: &Path, args: &Value) -> Result<PathBuf> {
    let raw = args
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing 'path' argument"))?;
    let path = Path::new(raw);
    Ok(if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ShellOutInterpreter;

    fn env(cwd: PathBuf) -> Arc<ToolEnvironment> {
        Arc::new(ToolEnvironment {
            cwd,
            interpreter: Arc::new(ShellOutInterpreter::default()),
        })
    }

    #[tokio::test]
    async fn create_then_view_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::default_registry();
        let environment = env(dir.path().to_path_buf());

        let result = registry
            .call(
                "create_file",
                environment.clone(),
                json!({ "path": "note.txt", "content": "hello" }),
            )
            .await
            .unwrap();
        assert!(!result.is_error);

        let result = registry
            .call("view_file", environment, json!({ "path": "note.txt" }))
            .await
            .unwrap();
        assert_eq!(result.text, "hello");
    }

    #[tokio::test]
    async fn view_directory_lists_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let registry = ToolRegistry::default_registry();
        let environment = env(dir.path().to_path_buf());
        let result = registry
            .call("view_directory", environment, json!({ "path": "." }))
            .await
            .unwrap();
        assert_eq!(result.text, "a.txt\nb.txt");
    }

    #[tokio::test]
    async fn edit_file_replaces_first_match_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "x x x").unwrap();
        let registry = ToolRegistry::default_registry();
        let environment = env(dir.path().to_path_buf());
        registry
            .call(
                "edit_file",
                environment,
                json!({ "path": "f.txt", "find": "x", "replace": "y" }),
            )
            .await
            .unwrap();
        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "y x x");
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::default_registry();
        let environment = env(dir.path().to_path_buf());
        assert!(registry.call("nope", environment, json!({})).await.is_err());
    }

    #[test]
    fn tool_result_wraps_error_for_conversation_injection() {
        let result = ToolResult::error("not allowed");
        assert_eq!(
            result.wrapped_error(),
            "<gsh_tool_call_error>not allowed</gsh_tool_call_error>"
        );
    }
}
