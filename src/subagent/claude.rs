//! Claude-dialect Subagent parser: Markdown files with YAML frontmatter
//! (SPEC_FULL §4.4 Parsing rules).

use std::path::Path;

use serde::Deserialize;

use super::{Dialect, SubagentDefinition, SubagentError};
use crate::agent::tools::ALL_TOOL_NAMES;

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: String,
    description: String,
    #[serde(default)]
    tools: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

/// Parse one Claude-dialect file. The subagent id is the file stem,
/// lowercased; the body after the closing `---` becomes the system prompt.
pub fn parse_file(path: &Path) -> Result<SubagentDefinition, SubagentError> {
    let content = std::fs::read_to_string(path)?;
    let (frontmatter, body) = split_frontmatter(&content).ok_or_else(|| SubagentError::Parse {
        path: path.to_path_buf(),
        message: "missing YAML frontmatter delimited by '---' lines".to_string(),
    })?;

    let parsed: Frontmatter = serde_yaml::from_str(frontmatter).map_err(|e| SubagentError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let allowed_tools = match parsed.tools {
        Some(list) => list
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        None => ALL_TOOL_NAMES.iter().map(|t| t.to_string()).collect(),
    };

    let definition = SubagentDefinition {
        id,
        name: parsed.name,
        description: parsed.description,
        dialect: Dialect::Claude,
        system_prompt: body.trim().to_string(),
        allowed_tools,
        file_regex: None,
        model: parsed.model,
    };
    definition.validate().map_err(|e| SubagentError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(definition)
}

/// Split `---\n<frontmatter>\n---\n<body>` handling both LF and CRLF.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let normalized = content.strip_prefix('\u{feff}').unwrap_or(content);
    let rest = normalized.trim_start_matches(['\r', '\n']);
    let rest = rest.strip_prefix("---")?;
    let rest = rest.trim_start_matches(['\r', '\n']);
    let end = rest.find("\n---")?;
    let frontmatter = &rest[..end];
    let after_marker = &rest[end + "\n---".len()..];
    let body_start = after_marker.find('\n').map(|i| i + 1).unwrap_or(after_marker.len());
    Some((frontmatter, &after_marker[body_start..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frontmatter_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviewer.md");
        std::fs::write(
            &path,
            "---\nname: Reviewer\ndescription: reviews diffs\ntools: view_file, bash\n---\nYou review code.\n",
        )
        .unwrap();

        let definition = parse_file(&path).unwrap();
        assert_eq!(definition.id, "reviewer");
        assert_eq!(definition.name, "Reviewer");
        assert_eq!(definition.allowed_tools, vec!["view_file", "bash"]);
        assert_eq!(definition.system_prompt, "You review code.");
    }

    #[test]
    fn missing_tools_field_means_all_five_tools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generalist.md");
        std::fs::write(&path, "---\nname: Generalist\ndescription: does anything\n---\nHelp out.").unwrap();

        let definition = parse_file(&path).unwrap();
        assert_eq!(definition.allowed_tools.len(), ALL_TOOL_NAMES.len());
    }

    #[test]
    fn handles_crlf_line_endings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crlf.md");
        std::fs::write(
            &path,
            "---\r\nname: Crlf\r\ndescription: test\r\n---\r\nBody text.\r\n",
        )
        .unwrap();

        let definition = parse_file(&path).unwrap();
        assert_eq!(definition.name, "Crlf");
        assert!(definition.system_prompt.contains("Body text."));
    }

    #[test]
    fn missing_frontmatter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.md");
        std::fs::write(&path, "just a plain file").unwrap();
        assert!(parse_file(&path).is_err());
    }
}
