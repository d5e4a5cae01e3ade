//! Completion Engine: sigil-aware, layered completion over a line and
//! cursor position (SPEC_FULL §4.5), grounded on the `CompletionSpec`
//! shape in `other_examples/.../just-bash/src/interpreter/types.rs`.

pub mod default;
pub mod git;
pub mod helper;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::interpreter::Interpreter;
use crate::macros::MacroTable;

/// Set by the `complete` builtin for one command name (word-list, function,
/// or external-command completion).
#[derive(Debug, Clone, Default)]
pub struct CompletionSpec {
    pub wordlist: Option<Vec<String>>,
    pub function: Option<String>,
    pub command: Option<String>,
}

const BUILTIN_CONTROLS: &[&str] = &["config", "new", "tokens", "subagents", "reload-subagents", "coach", "explain"];
const COACH_SUBCOMMANDS: &[&str] = &["stats", "achievements", "challenges", "tips", "reset-tips", "dashboard"];

/// Everything the layered completer needs: the working directory, the
/// session macro table, known subagent ids, registered Completion Specs,
/// and a handle to the interpreter (for function-spec invocation).
pub struct CompletionEngine {
    pub cwd: PathBuf,
    pub macros: MacroTable,
    pub subagent_names: Vec<String>,
    pub specs: HashMap<String, CompletionSpec>,
    /// `BishConfig::completion_fallback_command` (SPEC_FULL §4.5 step 5): a
    /// configured external global completer, tried after explicit specs and
    /// built-in completers and before the first-word/file-path fallbacks.
    /// When unset, `carapace` on `PATH` is used if present.
    pub fallback_command: Option<String>,
    pub interpreter: Arc<dyn Interpreter>,
}

impl CompletionEngine {
    pub fn new(cwd: PathBuf, interpreter: Arc<dyn Interpreter>) -> Self {
        Self {
            cwd,
            macros: MacroTable::new(),
            subagent_names: Vec::new(),
            specs: HashMap::new(),
            fallback_command: None,
            interpreter,
        }
    }

    /// Candidates for the token under `pos` in `line`.
    pub async fn complete(&self, line: &str, pos: usize) -> Vec<String> {
        let (token_start, token) = current_token(line, pos);

        if let Some(suffix) = token.strip_prefix("@/") {
            let mut names: Vec<String> = self
                .macros
                .names_with_prefix(suffix)
                .into_iter()
                .map(|n| format!("@/{n}"))
                .collect();
            names.sort();
            if names.is_empty() {
                return self.file_path_candidates(suffix);
            }
            return names;
        }

        if let Some(suffix) = token.strip_prefix("@!") {
            return self.complete_control(suffix);
        }

        if token.starts_with('@') && !token.starts_with("@?") {
            let suffix = &token[1..];
            let mut names: Vec<String> = self
                .subagent_names
                .iter()
                .filter(|n| n.starts_with(suffix))
                .map(|n| format!("@{n}"))
                .collect();
            names.sort();
            if names.is_empty() {
                return self.file_path_candidates(suffix);
            }
            return names;
        }

        let words = tokenize_preserving_quotes(&line[..pos.min(line.len())]);
        self.complete_command_line(line, pos, token_start, token, &words).await
    }

    fn complete_control(&self, suffix: &str) -> Vec<String> {
        if let Some(rest) = suffix.strip_prefix("coach") {
            if rest.starts_with(char::is_whitespace) {
                let prefix = rest.trim_start();
                let mut names: Vec<String> = COACH_SUBCOMMANDS
                    .iter()
                    .filter(|c| c.starts_with(prefix))
                    .map(|c| c.to_string())
                    .collect();
                names.sort();
                return names;
            }
        }
        let mut names: Vec<String> = BUILTIN_CONTROLS
            .iter()
            .filter(|c| c.starts_with(suffix))
            .map(|c| format!("@!{c}"))
            .collect();
        names.sort();
        names
    }

    async fn complete_command_line(
        &self,
        line: &str,
        pos: usize,
        token_start: usize,
        token: &str,
        words: &[String],
    ) -> Vec<String> {
        let ends_with_whitespace = line[..pos.min(line.len())].ends_with(char::is_whitespace);
        let cmd = words.first().map(String::as_str).unwrap_or_default();

        if !cmd.is_empty() {
            if let Some(spec) = self.specs.get(cmd) {
                if let Some(candidates) = self.complete_from_spec(spec, line, pos, token).await {
                    return dedup_sorted(candidates);
                }
            }

            if cmd == "git" {
                return dedup_sorted(git::complete(words, token));
            }

            if default::KNOWN_SIMPLE_COMMANDS.contains(&cmd) {
                return dedup_sorted(default::complete(cmd, token, &self.cwd));
            }

            if let Some(candidates) = default::complete_static_tool(cmd, words, token) {
                return dedup_sorted(candidates);
            }
        }

        if let Some(command) = self.global_completer_command() {
            let invocation = format!("{command} \"{}\" \"{pos}\" \"{}\"", shell_quote(line), shell_quote(token));
            let candidates = self.run_external_completer(&invocation).await;
            if !candidates.is_empty() {
                return dedup_sorted(candidates);
            }
        }

        if words.len() <= 1 && !ends_with_whitespace {
            return dedup_sorted(self.complete_first_word(token));
        }

        self.file_path_candidates(token_start_text(token))
    }

    /// SPEC_FULL §4.5 step 5: a configured global completer, falling back
    /// to `carapace` auto-discovery when one is on `PATH` and none is
    /// explicitly configured.
    fn global_completer_command(&self) -> Option<String> {
        self.fallback_command
            .clone()
            .or_else(|| command_on_path("carapace").then(|| "carapace".to_string()))
    }

    async fn complete_from_spec(
        &self,
        spec: &CompletionSpec,
        line: &str,
        pos: usize,
        token: &str,
    ) -> Option<Vec<String>> {
        if let Some(wordlist) = &spec.wordlist {
            return Some(
                wordlist
                    .iter()
                    .filter(|w| w.starts_with(token))
                    .cloned()
                    .collect(),
            );
        }
        if let Some(function) = &spec.function {
            let invocation = format!(
                "{function} \"{}\" \"{}\" \"{}\"",
                shell_quote(line),
                pos,
                shell_quote(token)
            );
            return Some(self.run_external_completer(&invocation).await);
        }
        if let Some(command) = &spec.command {
            return Some(self.run_external_completer(command).await);
        }
        None
    }

    async fn run_external_completer(&self, command: &str) -> Vec<String> {
        let Ok(statement) = self.interpreter.parse(command) else {
            return Vec::new();
        };
        match self.interpreter.execute(&statement, &self.cwd, &mut |_| {}).await {
            Ok(outcome) => String::from_utf8_lossy(&outcome.stdout)
                .lines()
                .map(|l| l.to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// SPEC_FULL §4.5 step 6: alias (macro) names plus PATH executables for
    /// a plain command prefix, or executable files in the referenced
    /// directory when the token itself looks like a path.
    fn complete_first_word(&self, prefix: &str) -> Vec<String> {
        if prefix.contains('/') {
            return self.executable_path_candidates(prefix);
        }

        let mut candidates: Vec<String> = self
            .macros
            .names_with_prefix(prefix)
            .into_iter()
            .map(|n| format!("@/{n}"))
            .collect();

        if let Some(path_var) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&path_var) {
                let Ok(entries) = std::fs::read_dir(&dir) else {
                    continue;
                };
                for entry in entries.filter_map(|e| e.ok()) {
                    if let Some(name) = entry.file_name().to_str() {
                        if name.starts_with(prefix) {
                            candidates.push(name.to_string());
                        }
                    }
                }
            }
        }
        candidates
    }

    /// Executable files under the directory a path-like first word refers
    /// to, e.g. `./scripts/<prefix>` or `/usr/local/bin/<prefix>`.
    fn executable_path_candidates(&self, prefix: &str) -> Vec<String> {
        let (dir, name_prefix) = split_path_prefix(prefix);
        let search_dir = if dir.is_empty() {
            self.cwd.clone()
        } else if Path::new(&dir).is_absolute() {
            PathBuf::from(&dir)
        } else {
            self.cwd.join(&dir)
        };

        let Ok(entries) = std::fs::read_dir(&search_dir) else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(&name_prefix) || !is_executable(&entry) {
                continue;
            }
            let candidate = if dir.is_empty() { name } else { format!("{dir}/{name}") };
            candidates.push(candidate);
        }
        dedup_sorted(candidates)
    }

    fn file_path_candidates(&self, prefix: &str) -> Vec<String> {
        let (dir, name_prefix) = split_path_prefix(prefix);
        let search_dir = if dir.is_empty() {
            self.cwd.clone()
        } else if Path::new(&dir).is_absolute() {
            PathBuf::from(&dir)
        } else {
            self.cwd.join(&dir)
        };

        let Ok(entries) = std::fs::read_dir(&search_dir) else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(&name_prefix) {
                continue;
            }
            let mut candidate = if dir.is_empty() {
                name.clone()
            } else {
                format!("{dir}/{name}")
            };
            if candidate.contains(char::is_whitespace) {
                candidate = format!("\"{candidate}\"");
            }
            candidates.push(candidate);
        }
        dedup_sorted(candidates)
    }
}

/// Whether an executable named `name` exists in any `PATH` directory.
fn command_on_path(name: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(name).is_file())
}

#[cfg(unix)]
fn is_executable(entry: &std::fs::DirEntry) -> bool {
    use std::os::unix::fs::PermissionsExt;
    entry
        .metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_entry: &std::fs::DirEntry) -> bool {
    true
}

fn shell_quote(s: &str) -> String {
    s.replace('"', "\\\"")
}

fn token_start_text(token: &str) -> &str {
    token
}

fn dedup_sorted(mut candidates: Vec<String>) -> Vec<String> {
    candidates.sort();
    candidates.dedup();
    candidates
}

/// Split a path-like prefix into its directory component and the final
/// partial name to match against.
fn split_path_prefix(prefix: &str) -> (String, String) {
    match prefix.rfind('/') {
        Some(idx) => (prefix[..idx].to_string(), prefix[idx + 1..].to_string()),
        None => (String::new(), prefix.to_string()),
    }
}

/// Find the whitespace-delimited token containing `pos`, quote-naively
/// (sufficient for sigil detection; full tokenisation happens separately).
fn current_token(line: &str, pos: usize) -> (usize, &str) {
    let bytes = line.as_bytes();
    let pos = pos.min(bytes.len());
    let mut start = pos;
    while start > 0 && !bytes[start - 1].is_ascii_whitespace() {
        start -= 1;
    }
    let mut end = pos;
    while end < bytes.len() && !bytes[end].is_ascii_whitespace() {
        end += 1;
    }
    (start, &line[start..end])
}

/// Tokenise a (possibly partial) line into words, preserving quoted
/// sections as single words with quotes stripped.
pub fn tokenize_preserving_quotes(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                    in_word = true;
                } else if c.is_whitespace() {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                } else {
                    current.push(c);
                    in_word = true;
                }
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ShellOutInterpreter;

    fn engine() -> CompletionEngine {
        CompletionEngine::new(
            std::env::current_dir().unwrap(),
            Arc::new(ShellOutInterpreter::default()),
        )
    }

    #[tokio::test]
    async fn macro_sigil_lists_matching_names_alphabetically() {
        let mut e = engine();
        e.macros.insert("zeta", "z");
        e.macros.insert("alpha", "a");
        e.macros.insert("alphabet", "ab");
        let result = e.complete("@/al", 4).await;
        assert_eq!(result, vec!["@/alpha", "@/alphabet"]);
    }

    #[tokio::test]
    async fn macro_sigil_falls_back_to_file_path_on_empty_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.txt"), "").unwrap();
        let mut e = engine();
        e.cwd = dir.path().to_path_buf();
        e.macros.insert("zeta", "z");
        let result = e.complete("@/al", 4).await;
        assert_eq!(result, vec!["alpha.txt"]);
    }

    #[tokio::test]
    async fn control_sigil_lists_fixed_builtin_set() {
        let e = engine();
        let result = e.complete("@!c", 3).await;
        assert_eq!(result, vec!["@!coach", "@!config"]);
    }

    #[tokio::test]
    async fn control_sigil_offers_coach_subcommands_after_trailing_space() {
        let e = engine();
        let result = e.complete("@!coach ", 8).await;
        assert_eq!(
            result,
            vec!["achievements", "challenges", "dashboard", "reset-tips", "stats", "tips"]
        );
    }

    #[tokio::test]
    async fn subagent_sigil_lists_matching_subagents() {
        let mut e = engine();
        e.subagent_names = vec!["reviewer".to_string(), "tester".to_string()];
        let result = e.complete("@rev", 4).await;
        assert_eq!(result, vec!["@reviewer"]);
    }

    #[tokio::test]
    async fn git_command_delegates_to_git_completer() {
        let e = engine();
        let result = e.complete("git chec", 8).await;
        assert!(result.contains(&"checkout".to_string()));
    }

    #[test]
    fn tokenizer_preserves_quoted_whitespace() {
        let words = tokenize_preserving_quotes("cmd \"two words\" plain");
        assert_eq!(words, vec!["cmd", "two words", "plain"]);
    }

    #[tokio::test]
    async fn file_path_candidates_quote_names_with_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("has space.txt"), "").unwrap();
        let mut e = engine();
        e.cwd = dir.path().to_path_buf();
        let result = e.complete("cat has", 7).await;
        assert!(result.iter().any(|c| c == "\"has space.txt\""));
    }

    #[tokio::test]
    async fn first_word_completion_offers_alias_names() {
        let mut e = engine();
        e.macros.insert("deploy", "ship it");
        let result = e.complete("dep", 3).await;
        assert!(result.contains(&"@/deploy".to_string()));
    }

    #[tokio::test]
    async fn first_word_completion_of_path_form_lists_executables_in_dir() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("run-tests.sh");
            std::fs::write(&script, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            std::fs::write(dir.path().join("notes.txt"), "").unwrap();

            let mut e = engine();
            let line = format!("{}/run", dir.path().display());
            let pos = line.len();
            let result = e.complete(&line, pos).await;
            assert!(result.iter().any(|c| c.ends_with("run-tests.sh")));
            assert!(!result.iter().any(|c| c.ends_with("notes.txt")));
        }
    }

    #[tokio::test]
    async fn global_completer_runs_before_first_word_fallback() {
        let mut e = engine();
        e.fallback_command = Some("echo globalhit #".to_string());
        let result = e.complete("gl", 2).await;
        assert_eq!(result, vec!["globalhit"]);
    }
}
