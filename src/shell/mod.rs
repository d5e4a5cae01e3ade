//! Interactive Read-Execute Loop (SPEC_FULL §4.1): classify one input line,
//! dispatch it to the right subsystem, and record the outcome.
//!
//! Dispatch-branch structure follows `cli/mod.rs`'s `match` over a parsed
//! command enum; the per-turn context→prompt→execute→record cycle follows
//! `session/coordinator.rs`'s coordinated-task loop shape, generalised from
//! one orchestrator task to one interactive shell turn.

pub mod config_tui;

use std::sync::Arc;

use colored::Colorize;

use crate::agent::AgentSession;
use crate::coach::Coach;
use crate::config::BishConfig;
use crate::error::BishError;
use crate::interpreter::Interpreter;
use crate::macros::MacroTable;
use crate::predict::Explainer;
use crate::preprocessor::preprocess;
use crate::state::ShellState;
use crate::subagent::executor::SubagentExecutor;
use crate::subagent::SubagentRegistry;

/// The result of classifying one trimmed input line (SPEC_FULL §4.1,
/// tested in the exact order given there).
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Control(String),
    MagicFix,
    Macro(String),
    Subagent { id: String, rest: String },
    AgentChat(String),
    Empty,
    Shell(String),
}

/// Classify a raw input line. `is_known_subagent` lets the caller decide
/// whether the first `@`-token names a loaded subagent (step 4) or falls
/// through to free-form chat (step 5).
pub fn classify(line: &str, is_known_subagent: impl Fn(&str) -> bool) -> Classification {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix("@!") {
        return Classification::Control(rest.trim().to_string());
    }
    if trimmed == "@?" {
        return Classification::MagicFix;
    }
    if let Some(name) = trimmed.strip_prefix("@/") {
        return Classification::Macro(name.trim().to_string());
    }
    if let Some(rest) = trimmed.strip_prefix('@') {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or_default();
        if !id.is_empty() && is_known_subagent(id) {
            return Classification::Subagent {
                id: id.to_string(),
                rest: parts.next().unwrap_or_default().trim().to_string(),
            };
        }
        return Classification::AgentChat(rest.trim().to_string());
    }
    if trimmed.is_empty() {
        return Classification::Empty;
    }
    Classification::Shell(trimmed.to_string())
}

const BUILTIN_CONTROLS: &[&str] = &["new", "tokens", "config", "coach", "explain"];

/// Outcome of dispatching one line; `Exit` carries the code the interpreter
/// reported (SPEC_FULL §4.1: "on interpreter-reported exit, terminate the
/// loop").
pub enum LoopOutcome {
    Continue,
    Exit(i32),
}

/// Confirmation prompt for the magic-fix flow. SPEC_FULL specifies
/// raw-mode single-byte prompting, which (like the line editor itself) is
/// an external-collaborator concern; this crate only needs the yes/no
/// decision, so it is modelled as an injectable function rather than
/// hard-coding a terminal dependency here.
pub type ConfirmFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Everything one interactive turn needs: shell state, stores, the agent,
/// subagents, macros, and the embedded interpreter.
pub struct Shell {
    pub state: ShellState,
    pub history: Arc<crate::history::HistoryStore>,
    pub analytics: Arc<crate::analytics::AnalyticsStore>,
    pub coach: Arc<Coach>,
    pub agent: Arc<AgentSession>,
    pub subagents: SubagentRegistry,
    pub macros: MacroTable,
    pub interpreter: Arc<dyn Interpreter>,
    pub config: BishConfig,
    pub confirm: ConfirmFn,
    pub explainer: Arc<Explainer>,
    cwd: std::path::PathBuf,
}

impl Shell {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: ShellState,
        history: Arc<crate::history::HistoryStore>,
        analytics: Arc<crate::analytics::AnalyticsStore>,
        coach: Arc<Coach>,
        agent: Arc<AgentSession>,
        subagents: SubagentRegistry,
        macros: MacroTable,
        interpreter: Arc<dyn Interpreter>,
        config: BishConfig,
        confirm: ConfirmFn,
        explainer: Arc<Explainer>,
        cwd: std::path::PathBuf,
    ) -> Self {
        Self {
            state,
            history,
            analytics,
            coach,
            agent,
            subagents,
            macros,
            interpreter,
            config,
            confirm,
            explainer,
            cwd,
        }
    }

    /// Classify and dispatch one input line (SPEC_FULL §4.1 steps 3-5).
    pub async fn dispatch_line(&mut self, line: &str) -> anyhow::Result<LoopOutcome> {
        let subagents = &self.subagents;
        let classification = classify(line, |id| subagents.get(id).is_some());

        match classification {
            Classification::Empty => Ok(LoopOutcome::Continue),
            Classification::Control(rest) => {
                self.run_control(&rest).await?;
                Ok(LoopOutcome::Continue)
            }
            Classification::MagicFix => {
                self.run_magic_fix().await?;
                Ok(LoopOutcome::Continue)
            }
            Classification::Macro(name) => {
                match self.macros.expand(&name) {
                    Ok(prompt) => {
                        let prompt = prompt.to_string();
                        self.run_agent_chat(&prompt).await?;
                    }
                    Err(err) => eprintln!("{err}"),
                }
                Ok(LoopOutcome::Continue)
            }
            Classification::Subagent { id, rest } => {
                self.run_subagent(&id, &rest).await?;
                Ok(LoopOutcome::Continue)
            }
            Classification::AgentChat(text) => {
                self.run_agent_chat(&text).await?;
                Ok(LoopOutcome::Continue)
            }
            Classification::Shell(command) => self.run_shell_command(&command).await,
        }
    }

    async fn run_control(&mut self, rest: &str) -> anyhow::Result<()> {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let directive = parts.next().unwrap_or_default();
        let arg = parts.next().unwrap_or_default().trim();

        match directive {
            "new" => self.agent.reset_chat().await,
            "tokens" => self.agent.print_token_stats().await,
            "config" => {
                tracing::debug!("launching config TUI");
                config_tui::run(&mut self.config)?;
                self.config.apply_env_overrides();
            }
            "coach" => self.run_coach_subcommand(arg).await?,
            "explain" => match self.explainer.explain(arg).await {
                Ok(explanation) => println!("{explanation}"),
                Err(err) => eprintln!("{err}"),
            },
            other if BUILTIN_CONTROLS.contains(&other) => {}
            other => {
                eprintln!("{}", BishError::UnknownDirective(other.to_string()));
            }
        }
        Ok(())
    }

    async fn run_coach_subcommand(&self, subcommand: &str) -> anyhow::Result<()> {
        match subcommand {
            "" | "stats" => println!("{}", self.coach.stats()?),
            "achievements" => print_milestones(&self.coach.achievements()?),
            "challenges" => print_milestones(&self.coach.challenges()?),
            "tips" => {
                for tip in self.coach.tips(5).await? {
                    println!("- {}", tip.text);
                }
            }
            "reset-tips" => self.coach.reset_tips(),
            "dashboard" => {
                let dashboard = self.coach.dashboard().await?;
                println!("{}", dashboard.stats);
                print_milestones(&dashboard.achievements);
            }
            other => eprintln!(
                "{}",
                BishError::UnknownDirective(format!("coach {other}"))
            ),
        }
        Ok(())
    }

    /// `@?`: diagnose the last failed command (SPEC_FULL §4.1, §8 scenario 3).
    async fn run_magic_fix(&mut self) -> anyhow::Result<()> {
        if self.state.last_exit_code() == 0 {
            println!("Last command succeeded");
            return Ok(());
        }

        let prompt = format!(
            "The following command failed.\ncommand: {}\nexit code: {}\nstderr:\n{}\n\nSuggest a corrected command in a fenced code block.",
            self.state.last_command(),
            self.state.last_exit_code(),
            self.state.last_stderr(),
        );

        let chunks = self.agent.chat(&prompt).await?;
        let reply = chunks.join("\n");
        let Some(fix) = extract_last_fenced_shell_block(&reply) else {
            println!("{reply}");
            return Ok(());
        };

        println!("{}", fix.cyan());
        let prompt_text = format!("Run `{fix}`? [y/N]");
        let confirmed = if self.config.default_to_yes {
            true
        } else {
            (self.confirm)(&prompt_text)
        };
        if confirmed {
            self.run_shell_command(&fix).await?;
        }
        Ok(())
    }

    async fn run_agent_chat(&self, prompt: &str) -> anyhow::Result<()> {
        for chunk in self.agent.chat(prompt).await? {
            println!("{chunk}");
        }
        Ok(())
    }

    async fn run_subagent(&self, id: &str, prompt: &str) -> anyhow::Result<()> {
        let Some(definition) = self.subagents.get(id).cloned() else {
            eprintln!("{}", BishError::UnknownSubagent(id.to_string()));
            return Ok(());
        };
        let executor = SubagentExecutor::new(
            definition,
            self.agent_provider(),
            self.agent_context(),
            self.agent_tools(),
            self.agent_environment(),
        );
        for chunk in executor.chat(prompt).await? {
            println!("{chunk}");
        }
        Ok(())
    }

    /// Preprocess, parse, and run one shell command, recording a History
    /// Entry and notifying the coach (SPEC_FULL §4.1 "Shell execution
    /// path").
    async fn run_shell_command(&mut self, raw: &str) -> anyhow::Result<LoopOutcome> {
        let preprocessed = preprocess(raw);
        let cwd_text = self.cwd.display().to_string();

        let statement = match self.interpreter.parse(&preprocessed) {
            Ok(s) => s,
            Err(err) => {
                eprintln!("{err}");
                return Ok(LoopOutcome::Continue);
            }
        };

        self.state.begin_command(&preprocessed);
        let entry = self.history.start(&preprocessed, &cwd_text)?;

        let start = std::time::Instant::now();
        let state = self.state.clone();
        let outcome = self
            .interpreter
            .execute(&statement, &self.cwd, &mut |bytes| state.capture_stderr(bytes))
            .await;
        let elapsed_ms = start.elapsed().as_millis();

        let exit_code = match &outcome {
            Ok(o) => o.exit_code,
            Err(_) => -1,
        };
        self.state.finish_command(exit_code);
        self.history.finish(&entry, exit_code)?;
        std::env::set_var("BISH_LAST_COMMAND_EXIT_CODE", exit_code.to_string());
        std::env::set_var("BISH_LAST_COMMAND_DURATION_MS", elapsed_ms.to_string());

        let mut finished_entry = entry;
        finished_entry.exit_code = Some(exit_code);
        self.coach.notify_command(&finished_entry);

        if let Ok(outcome) = &outcome {
            if let Some(code) = self.interpreter.requested_exit(outcome) {
                return Ok(LoopOutcome::Exit(code));
            }
        }

        Ok(LoopOutcome::Continue)
    }

    fn agent_provider(&self) -> Arc<dyn crate::agent::provider::Provider> {
        self.agent.provider()
    }
    fn agent_context(&self) -> Arc<crate::context::ContextProvider> {
        self.agent.context()
    }
    fn agent_tools(&self) -> Arc<crate::agent::tools::ToolRegistry> {
        self.agent.tools()
    }
    fn agent_environment(&self) -> Arc<crate::agent::tools::ToolEnvironment> {
        self.agent.environment()
    }
}

fn print_milestones(milestones: &[crate::coach::Milestone]) {
    for m in milestones {
        if m.achieved {
            println!("{} {}", "[x]".green(), m.title);
        } else {
            println!("{} {}", "[ ]".dimmed(), m.title);
        }
    }
}

/// Extract the last fenced code block whose language tag is bash/sh/zsh or
/// absent (SPEC_FULL §4.1 magic-fix).
fn extract_last_fenced_shell_block(text: &str) -> Option<String> {
    const ACCEPTED_LANGS: &[&str] = &["bash", "sh", "zsh", ""];
    let mut last: Option<String> = None;
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let Some(lang) = line.trim_start().strip_prefix("```") else {
            continue;
        };
        if !ACCEPTED_LANGS.contains(&lang.trim()) {
            continue;
        }
        let mut body = Vec::new();
        for inner in lines.by_ref() {
            if inner.trim_start().starts_with("```") {
                break;
            }
            body.push(inner);
        }
        last = Some(body.join("\n").trim().to_string());
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_control_directive() {
        assert_eq!(
            classify("@!new", |_| false),
            Classification::Control("new".to_string())
        );
    }

    #[test]
    fn classifies_magic_fix() {
        assert_eq!(classify("@?", |_| false), Classification::MagicFix);
    }

    #[test]
    fn classifies_macro_before_generic_agent_chat() {
        assert_eq!(
            classify("@/explain", |_| false),
            Classification::Macro("explain".to_string())
        );
    }

    #[test]
    fn classifies_known_subagent_by_id() {
        let result = classify("@reviewer check this", |id| id == "reviewer");
        assert_eq!(
            result,
            Classification::Subagent {
                id: "reviewer".to_string(),
                rest: "check this".to_string(),
            }
        );
    }

    #[test]
    fn unknown_at_token_falls_through_to_agent_chat() {
        let result = classify("@unknown do a thing", |_| false);
        assert_eq!(result, Classification::AgentChat("unknown do a thing".to_string()));
    }

    #[test]
    fn blank_line_is_empty() {
        assert_eq!(classify("   ", |_| false), Classification::Empty);
    }

    #[test]
    fn plain_text_is_a_shell_command() {
        assert_eq!(
            classify("git status", |_| false),
            Classification::Shell("git status".to_string())
        );
    }

    #[test]
    fn reclassifying_unchanged_line_is_idempotent() {
        let line = "@!tokens";
        let first = classify(line, |_| false);
        let second = classify(line, |_| false);
        assert_eq!(first, second);
    }

    #[test]
    fn extracts_last_bash_fenced_block() {
        let reply = "try this:\n```bash\ngit status\n```\nor maybe:\n```sh\ngit log\n```";
        assert_eq!(extract_last_fenced_shell_block(reply).as_deref(), Some("git log"));
    }

    #[test]
    fn ignores_non_shell_fenced_blocks() {
        let reply = "```json\n{\"a\":1}\n```\n```bash\nls -la\n```";
        assert_eq!(extract_last_fenced_shell_block(reply).as_deref(), Some("ls -la"));
    }

    #[test]
    fn returns_none_when_no_fenced_block_present() {
        assert_eq!(extract_last_fenced_shell_block("just text"), None);
    }
}
