//! Roo-dialect Subagent parser: `customModes` YAML plus `rules-<slug>/`
//! directories of concatenated Markdown fragments (SPEC_FULL §4.4).

use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;

use super::{Dialect, SubagentDefinition, SubagentError};

#[derive(Debug, Deserialize)]
struct ModesFile {
    #[serde(rename = "customModes", default)]
    custom_modes: Vec<ModeEntry>,
}

#[derive(Debug, Deserialize)]
struct ModeEntry {
    slug: String,
    #[serde(rename = "roleDefinition")]
    role_definition: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "customInstructions", default)]
    custom_instructions: Option<String>,
    #[serde(rename = "whenToUse", default)]
    when_to_use: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    groups: Vec<Value>,
}

/// Parse every `customModes` entry in one YAML file into a Subagent
/// Definition. A file can yield zero, one, or many definitions.
pub fn parse_modes_file(path: &Path) -> Vec<Result<SubagentDefinition, SubagentError>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return vec![Err(SubagentError::Io(e))],
    };
    let parsed: ModesFile = match serde_yaml::from_str(&content) {
        Ok(p) => p,
        Err(e) => {
            return vec![Err(SubagentError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })]
        }
    };

    parsed
        .custom_modes
        .into_iter()
        .map(|entry| build_from_mode_entry(path, entry))
        .collect()
}

fn build_from_mode_entry(path: &Path, entry: ModeEntry) -> Result<SubagentDefinition, SubagentError> {
    let (allowed_tools, file_regex) = if entry.groups.is_empty() {
        (vec!["view_file".to_string(), "view_directory".to_string()], None)
    } else {
        resolve_groups(&entry.groups)
    };

    let mut system_prompt = entry.role_definition.clone();
    if let Some(instructions) = &entry.custom_instructions {
        system_prompt.push_str("\n\n");
        system_prompt.push_str(instructions);
    }
    if let Some(when) = &entry.when_to_use {
        system_prompt.push_str("\n\nWhen to use: ");
        system_prompt.push_str(when);
    }

    let definition = SubagentDefinition {
        id: entry.slug.clone(),
        name: entry.name.unwrap_or(entry.slug),
        description: entry.description.unwrap_or_default(),
        dialect: Dialect::Roo,
        system_prompt,
        allowed_tools,
        file_regex,
        model: entry.model,
    };
    definition.validate().map_err(|e| SubagentError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(definition)
}

/// Map `groups` entries (bare strings, `[name, {config}]` pairs, or
/// `{group, fileRegex}` maps) to a tool set plus optional file restriction.
fn resolve_groups(groups: &[Value]) -> (Vec<String>, Option<String>) {
    let mut tools = std::collections::BTreeSet::new();
    let mut file_regex = None;

    for group in groups {
        let (name, regex) = match group {
            Value::String(s) => (s.clone(), None),
            Value::Sequence(seq) => {
                let name = seq.first().and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let regex = seq
                    .get(1)
                    .and_then(|v| v.get("fileRegex"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                (name, regex)
            }
            Value::Mapping(map) => {
                let name = map
                    .get(&Value::String("group".to_string()))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let regex = map
                    .get(&Value::String("fileRegex".to_string()))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                (name, regex)
            }
            _ => continue,
        };

        if let Some(r) = regex {
            file_regex = Some(r);
        }

        match name.as_str() {
            "read" => {
                tools.insert("view_file".to_string());
                tools.insert("view_directory".to_string());
            }
            "edit" => {
                tools.insert("create_file".to_string());
                tools.insert("edit_file".to_string());
                tools.insert("view_file".to_string());
                tools.insert("view_directory".to_string());
            }
            "command" => {
                tools.insert("bash".to_string());
            }
            "browser" | "mcp" => {}
            _ => {}
        }
    }

    (tools.into_iter().collect(), file_regex)
}

/// Concatenate every `.md` file within a `rules-<slug>/` directory
/// (double-newline separated) into one subagent's system prompt.
pub fn parse_rules_dir(dir: &Path, slug: &str) -> Result<SubagentDefinition, SubagentError> {
    let mut fragments = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("md"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        fragments.push(std::fs::read_to_string(entry.path())?);
    }

    let definition = SubagentDefinition {
        id: slug.to_string(),
        name: slug.to_string(),
        description: String::new(),
        dialect: Dialect::RooRules,
        system_prompt: fragments.join("\n\n"),
        allowed_tools: vec![
            "bash".to_string(),
            "view_file".to_string(),
            "create_file".to_string(),
            "edit_file".to_string(),
        ],
        file_regex: None,
        model: None,
    };
    definition.validate().map_err(|e| SubagentError::Parse {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(definition)
}
