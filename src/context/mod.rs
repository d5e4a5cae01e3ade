//! Context Provider: a pluggable retriever set producing a snapshot of
//! session facts (SPEC_FULL §4.7).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::history::HistoryStore;

/// Immutable, once-assembled snapshot of retriever outputs.
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    entries: BTreeMap<String, String>,
}

impl ContextBundle {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the bundle as a single string suitable for embedding in a
    /// system prompt.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(name, text)| format!("<{name}>\n{text}\n</{name}>"))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A single context source.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;
    async fn get_context(&self) -> anyhow::Result<String>;
}

/// Holds an ordered list of retrievers and assembles them into a
/// [`ContextBundle`] once per prompt.
pub struct ContextProvider {
    retrievers: Vec<Arc<dyn Retriever>>,
}

impl ContextProvider {
    pub fn new(retrievers: Vec<Arc<dyn Retriever>>) -> Self {
        Self { retrievers }
    }

    /// Call each retriever, trim outputs, and return a bundle keyed by
    /// retriever name. A failing retriever logs a warning and is omitted —
    /// it must never fail the whole snapshot.
    pub async fn get_context(&self) -> ContextBundle {
        let mut entries = BTreeMap::new();
        for retriever in &self.retrievers {
            match retriever.get_context().await {
                Ok(text) => {
                    entries.insert(retriever.name().to_string(), text.trim().to_string());
                }
                Err(err) => {
                    tracing::warn!(retriever = retriever.name(), error = %err, "retriever failed");
                }
            }
        }
        ContextBundle { entries }
    }
}

/// OS/architecture summary.
pub struct SystemInfoRetriever;

#[async_trait]
impl Retriever for SystemInfoRetriever {
    fn name(&self) -> &str {
        "system_info"
    }

    async fn get_context(&self) -> anyhow::Result<String> {
        Ok(format!(
            "os={} arch={} family={}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            std::env::consts::FAMILY,
        ))
    }
}

/// Current directory wrapped in `<working_dir>...</working_dir>`.
pub struct WorkingDirectoryRetriever {
    pub cwd: PathBuf,
}

#[async_trait]
impl Retriever for WorkingDirectoryRetriever {
    fn name(&self) -> &str {
        "working_directory"
    }

    async fn get_context(&self) -> anyhow::Result<String> {
        Ok(format!(
            "<working_dir>{}</working_dir>",
            self.cwd.display()
        ))
    }
}

/// Project root and `git status` output, or a static marker if not in a repo.
/// Runs in a subshell and must not block more than a few seconds; errors are
/// swallowed (SPEC_FULL §5).
pub struct GitStatusRetriever {
    pub cwd: PathBuf,
}

#[async_trait]
impl Retriever for GitStatusRetriever {
    fn name(&self) -> &str {
        "git_status"
    }

    async fn get_context(&self) -> anyhow::Result<String> {
        let root = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            tokio::process::Command::new("git")
                .args(["rev-parse", "--show-toplevel"])
                .current_dir(&self.cwd)
                .output(),
        )
        .await;

        let Ok(Ok(root_output)) = root else {
            return Ok("not in a git repository".to_string());
        };
        if !root_output.status.success() {
            return Ok("not in a git repository".to_string());
        }
        let root_path = String::from_utf8_lossy(&root_output.stdout).trim().to_string();

        let status = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            tokio::process::Command::new("git")
                .args(["status", "--short", "--branch"])
                .current_dir(&self.cwd)
                .output(),
        )
        .await;

        let status_text = match status {
            Ok(Ok(out)) if out.status.success() => String::from_utf8_lossy(&out.stdout).to_string(),
            _ => String::new(),
        };

        Ok(format!("root={root_path}\n{status_text}"))
    }
}

/// Last N commands with directory headers.
pub struct HistoryConciseRetriever {
    pub history: Arc<HistoryStore>,
    pub cwd: PathBuf,
    pub limit: usize,
}

#[async_trait]
impl Retriever for HistoryConciseRetriever {
    fn name(&self) -> &str {
        "history_concise"
    }

    async fn get_context(&self) -> anyhow::Result<String> {
        let cwd = self.cwd.display().to_string();
        let entries = self.history.recent(&cwd, self.limit)?;
        let mut out = format!("# {cwd}\n");
        for entry in entries {
            out.push_str(&entry.command);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Last M commands in CSV-like form with sequence and exit code.
pub struct HistoryVerboseRetriever {
    pub history: Arc<HistoryStore>,
    pub cwd: PathBuf,
    pub limit: usize,
}

#[async_trait]
impl Retriever for HistoryVerboseRetriever {
    fn name(&self) -> &str {
        "history_verbose"
    }

    async fn get_context(&self) -> anyhow::Result<String> {
        let cwd = self.cwd.display().to_string();
        let entries = self.history.recent(&cwd, self.limit)?;
        let mut out = String::from("seq,command,exit_code\n");
        for (i, entry) in entries.iter().enumerate() {
            out.push_str(&format!(
                "{},{},{}\n",
                i + 1,
                entry.command.replace(',', ";"),
                entry
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "?".to_string()),
            ));
        }
        Ok(out)
    }
}
