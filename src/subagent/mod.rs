//! Subagent Dispatcher: discovery, validation, and hot-reload of specialised
//! LLM personas loaded from on-disk configuration (SPEC_FULL §4.4).

pub mod claude;
pub mod executor;
pub mod roo;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;

use crate::agent::tools::ALL_TOOL_NAMES;

/// Which on-disk dialect a Subagent Definition was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Claude,
    Roo,
    RooRules,
}

/// A specialised LLM persona loaded from a config file (SPEC_FULL §3).
#[derive(Debug, Clone, PartialEq)]
pub struct SubagentDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub dialect: Dialect,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    pub file_regex: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubagentError {
    #[error("subagent '{0}': id, name, and system prompt must be non-empty")]
    EmptyField(String),
    #[error("subagent '{id}': tool '{tool}' is not part of the five-tool universe")]
    UnknownTool { id: String, tool: String },
    #[error("subagent '{id}': invalid fileRegex '{pattern}': {source}")]
    InvalidFileRegex {
        id: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SubagentDefinition {
    /// Non-empty id/name/prompt, allowed tools within the five-tool
    /// universe, and a compilable `fileRegex` (SPEC_FULL §4.4 Validation).
    pub fn validate(&self) -> Result<(), SubagentError> {
        if self.id.trim().is_empty() || self.name.trim().is_empty() || self.system_prompt.trim().is_empty() {
            return Err(SubagentError::EmptyField(self.id.clone()));
        }
        for tool in &self.allowed_tools {
            if !ALL_TOOL_NAMES.contains(&tool.as_str()) {
                return Err(SubagentError::UnknownTool {
                    id: self.id.clone(),
                    tool: tool.clone(),
                });
            }
        }
        if let Some(pattern) = &self.file_regex {
            Regex::new(pattern).map_err(|source| SubagentError::InvalidFileRegex {
                id: self.id.clone(),
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

struct CacheEntry {
    definition: SubagentDefinition,
    mtime: SystemTime,
    source: PathBuf,
}

/// In-memory map of discovered Subagent Definitions, keyed by id, with
/// mtime-based hot-reload (SPEC_FULL §4.4, §9).
pub struct SubagentRegistry {
    claude_dir: PathBuf,
    roo_dir: PathBuf,
    entries: HashMap<String, CacheEntry>,
}

impl SubagentRegistry {
    pub fn new(claude_dir: impl Into<PathBuf>, roo_dir: impl Into<PathBuf>) -> Self {
        Self {
            claude_dir: claude_dir.into(),
            roo_dir: roo_dir.into(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&SubagentDefinition> {
        self.entries.get(id).map(|e| &e.definition)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubagentDefinition> {
        self.entries.values().map(|e| &e.definition)
    }

    /// Re-scan both roots. Only entries whose source mtime moved are
    /// re-parsed; entries that fail validation on reload retain their
    /// previous valid definition and surface the parse error once.
    pub fn refresh(&mut self) -> Vec<SubagentError> {
        let mut errors = Vec::new();
        let discovered = discover(&self.claude_dir, &self.roo_dir);

        for (source, mtime, result) in discovered {
            match result {
                Ok(definition) => {
                    let needs_update = self
                        .entries
                        .get(&definition.id)
                        .map(|e| e.mtime != mtime || e.source != source)
                        .unwrap_or(true);
                    if needs_update {
                        self.entries.insert(
                            definition.id.clone(),
                            CacheEntry {
                                definition,
                                mtime,
                                source,
                            },
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(source = %source.display(), error = %err, "subagent reload failed, keeping previous definition");
                    errors.push(err);
                }
            }
        }

        errors
    }
}

/// Walk both roots and parse every candidate file/directory into a
/// `(source, mtime, Result<SubagentDefinition, SubagentError>)` triple.
fn discover(
    claude_dir: &Path,
    roo_dir: &Path,
) -> Vec<(PathBuf, SystemTime, Result<SubagentDefinition, SubagentError>)> {
    let mut results = Vec::new();

    if claude_dir.is_dir() {
        for entry in walkdir::WalkDir::new(claude_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let parsed = claude::parse_file(entry.path());
            results.push((entry.path().to_path_buf(), mtime, parsed));
        }
    }

    if roo_dir.is_dir() {
        for entry in walkdir::WalkDir::new(roo_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let is_yaml_config = entry.file_type().is_file()
                && (matches!(entry.path().extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"))
                    || entry.file_name() == ".roomodes");
            if is_yaml_config {
                for parsed in roo::parse_modes_file(entry.path()) {
                    results.push((entry.path().to_path_buf(), mtime, parsed));
                }
            } else if entry.file_type().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(slug) = name.strip_prefix("rules-") {
                        let parsed = roo::parse_rules_dir(entry.path(), slug);
                        results.push((entry.path().to_path_buf(), mtime, parsed));
                    }
                }
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str) -> SubagentDefinition {
        SubagentDefinition {
            id: id.to_string(),
            name: "Reviewer".to_string(),
            description: String::new(),
            dialect: Dialect::Claude,
            system_prompt: "review code".to_string(),
            allowed_tools: vec!["view_file".to_string()],
            file_regex: Some(r"^src/.*\.rs$".to_string()),
            model: None,
        }
    }

    #[test]
    fn validate_accepts_well_formed_definition() {
        assert!(def("reviewer").validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_id() {
        let mut d = def("");
        d.id = String::new();
        assert!(matches!(d.validate(), Err(SubagentError::EmptyField(_))));
    }

    #[test]
    fn validate_rejects_tool_outside_five_tool_universe() {
        let mut d = def("reviewer");
        d.allowed_tools.push("spawn_agent".to_string());
        assert!(matches!(
            d.validate(),
            Err(SubagentError::UnknownTool { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_file_regex() {
        let mut d = def("reviewer");
        d.file_regex = Some("(unclosed".to_string());
        assert!(matches!(
            d.validate(),
            Err(SubagentError::InvalidFileRegex { .. })
        ));
    }

    #[test]
    fn refresh_only_reparses_changed_sources() {
        let dir = tempfile::tempdir().unwrap();
        let claude_dir = dir.path().join("claude");
        std::fs::create_dir_all(&claude_dir).unwrap();
        std::fs::write(
            claude_dir.join("reviewer.md"),
            "---\nname: Reviewer\ndescription: reviews code\n---\nReview the diff.",
        )
        .unwrap();

        let mut registry = SubagentRegistry::new(&claude_dir, dir.path().join("roo"));
        let errors = registry.refresh();
        assert!(errors.is_empty());
        assert!(registry.get("reviewer").is_some());

        let errors_again = registry.refresh();
        assert!(errors_again.is_empty());
        assert!(registry.get("reviewer").is_some());
    }
}
