//! Built-in default completer for common simple commands, plus a static
//! subcommand completer for common tool commands (SPEC_FULL §4.5 layers
//! 3-4).

use std::path::Path;

pub const KNOWN_SIMPLE_COMMANDS: &[&str] = &["cd", "ssh", "export", "kill", "make", "unset"];

const SIGNAL_NAMES: &[&str] = &[
    "HUP", "INT", "QUIT", "ILL", "TRAP", "ABRT", "KILL", "SEGV", "PIPE", "ALRM", "TERM", "USR1",
    "USR2", "CHLD", "CONT", "STOP", "TSTP", "WINCH",
];

const STATIC_TOOL_SUBCOMMANDS: &[(&str, &[&str])] = &[
    (
        "docker",
        &["build", "run", "ps", "images", "exec", "logs", "stop", "rm", "pull", "push", "compose"],
    ),
    (
        "npm",
        &["install", "run", "start", "test", "build", "ci", "publish", "init", "update"],
    ),
    ("cargo", &["build", "run", "test", "check", "clippy", "fmt", "add", "publish", "doc"]),
    ("kubectl", &["get", "apply", "delete", "describe", "logs", "exec", "rollout", "scale"]),
];

/// Dispatch to the per-command builtin completer.
pub fn complete(cmd: &str, token: &str, cwd: &Path) -> Vec<String> {
    match cmd {
        "cd" => directories(token, cwd),
        "ssh" => known_hosts(token),
        "export" | "unset" => env_var_names(token),
        "kill" => signal_names(token),
        "make" => make_targets(token, cwd),
        _ => Vec::new(),
    }
}

/// Static subcommand list for a recognised common tool, if the token
/// position is the subcommand slot.
pub fn complete_static_tool(cmd: &str, words: &[String], token: &str) -> Option<Vec<String>> {
    let (_, subcommands) = STATIC_TOOL_SUBCOMMANDS.iter().find(|(name, _)| *name == cmd)?;
    if words.len() > 2 {
        return None;
    }
    Some(
        subcommands
            .iter()
            .filter(|s| s.starts_with(token))
            .map(|s| s.to_string())
            .collect(),
    )
}

fn directories(token: &str, cwd: &Path) -> Vec<String> {
    let search_dir = if token.contains('/') {
        let prefix_dir = token.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        if prefix_dir.is_empty() {
            cwd.to_path_buf()
        } else {
            cwd.join(prefix_dir)
        }
    } else {
        cwd.to_path_buf()
    };

    let Ok(entries) = std::fs::read_dir(&search_dir) else {
        return Vec::new();
    };

    let name_prefix = token.rsplit('/').next().unwrap_or(token);
    let dir_prefix = token.strip_suffix(name_prefix).unwrap_or("");

    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with(name_prefix))
        .map(|name| format!("{dir_prefix}{name}/"))
        .collect()
}

fn known_hosts(token: &str) -> Vec<String> {
    let Some(home) = dirs_home() else {
        return Vec::new();
    };
    let config_path = home.join(".ssh").join("config");
    let Ok(content) = std::fs::read_to_string(&config_path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line.strip_prefix("Host ")?;
            Some(rest.to_string())
        })
        .flat_map(|hosts| hosts.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|host| host.starts_with(token) && !host.contains('*'))
        .collect()
}

fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

fn env_var_names(token: &str) -> Vec<String> {
    std::env::vars()
        .map(|(k, _)| k)
        .filter(|k| k.starts_with(token))
        .collect()
}

fn signal_names(token: &str) -> Vec<String> {
    let token = token.trim_start_matches('-').trim_start_matches("SIG");
    SIGNAL_NAMES
        .iter()
        .filter(|s| s.starts_with(token))
        .map(|s| format!("SIG{s}"))
        .collect()
}

fn make_targets(token: &str, cwd: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(cwd.join("Makefile"))
        .or_else(|_| std::fs::read_to_string(cwd.join("makefile")))
    else {
        return Vec::new();
    };
    content
        .lines()
        .filter_map(|line| {
            if line.starts_with([' ', '\t', '#']) {
                return None;
            }
            let (name, _) = line.split_once(':')?;
            if name.contains(' ') || name.is_empty() {
                return None;
            }
            Some(name.to_string())
        })
        .filter(|name| name.starts_with(token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_only_lists_dirs_not_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "").unwrap();
        let result = directories("", dir.path());
        assert_eq!(result, vec!["sub/".to_string()]);
    }

    #[test]
    fn signal_names_match_prefix_case_insensitive_of_sig() {
        let result = signal_names("TE");
        assert_eq!(result, vec!["SIGTERM".to_string()]);
    }

    #[test]
    fn make_targets_parses_top_level_rules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Makefile"), "build:\n\techo hi\ntest: build\n\techo t\n").unwrap();
        let mut result = make_targets("", dir.path());
        result.sort();
        assert_eq!(result, vec!["build".to_string(), "test".to_string()]);
    }

    #[test]
    fn static_tool_completer_only_fires_for_subcommand_slot() {
        let words = vec!["docker".to_string(), "ru".to_string()];
        let result = complete_static_tool("docker", &words, "ru").unwrap();
        assert_eq!(result, vec!["run".to_string()]);

        let words_too_long = vec!["docker".to_string(), "run".to_string(), "--rm".to_string()];
        assert!(complete_static_tool("docker", &words_too_long, "--rm").is_none());
    }

    #[test]
    fn unknown_tool_returns_none() {
        assert!(complete_static_tool("nonexistent", &["nonexistent".to_string()], "").is_none());
    }
}
