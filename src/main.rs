//! `bish` binary entry point: flag parsing, ambient logging, store/session
//! wiring, and the four invocation modes (SPEC_FULL §6), grounded on
//! `crates/ccswarm/src/main.rs`'s `tracing_subscriber::registry()...init()`
//! setup plus `#[tokio::main]` shape.

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bish::agent::provider::{HttpProvider, HttpProviderConfig, Provider, StaticProvider};
use bish::agent::tools::{ToolEnvironment, ToolRegistry};
use bish::agent::AgentSession;
use bish::analytics::AnalyticsStore;
use bish::coach::Coach;
use bish::completion::helper::BishHelper;
use bish::completion::CompletionEngine;
use bish::config::{BishConfig, DataPaths, ProviderSettings};
use bish::context::{
    ContextProvider, GitStatusRetriever, HistoryConciseRetriever, HistoryVerboseRetriever, Retriever,
    SystemInfoRetriever, WorkingDirectoryRetriever,
};
use bish::history::HistoryStore;
use bish::interpreter::{Interpreter, ShellOutInterpreter};
use bish::macros::MacroTable;
use bish::predict::{Explainer, Predictor};
use bish::shell::{LoopOutcome, Shell};
use bish::state::ShellState;
use bish::subagent::SubagentRegistry;

const HISTORY_CONTEXT_LIMIT: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = bish::cli::Cli::parse_normalized();

    if cli.version {
        println!("bish {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let home = home_dir();
    let paths = DataPaths::under_home(&home);
    let _log_guard = init_logging(&paths.log_file)?;

    let config_path = home.join(".config").join("bish").join("config.json");
    let mut config = BishConfig::load(&config_path, cli.strict_config)
        .with_context(|| format!("failed to load config at '{}'", config_path.display()))?;
    config.apply_env_overrides();

    let cwd = std::env::current_dir().context("resolve current directory")?;

    let rc_files = resolve_rc_files(cli.login, cli.rcfile.as_deref(), &home);
    let interpreter: Arc<dyn Interpreter> = Arc::new(ShellOutInterpreter::default());
    source_rc_files(interpreter.as_ref(), &cwd, &rc_files).await;

    let history = Arc::new(HistoryStore::open(&paths.history_db)?);
    let analytics = Arc::new(AnalyticsStore::open(&paths.analytics_db)?);

    let provider_settings = config.provider_settings().cloned();
    let context = build_context_provider(history.clone(), &cwd);
    let tools = Arc::new(ToolRegistry::default_registry());
    let environment = Arc::new(ToolEnvironment {
        cwd: cwd.clone(),
        interpreter: interpreter.clone(),
    });

    let agent_provider: Arc<dyn Provider> = Arc::from(make_provider(provider_settings.as_ref()));
    let agent = Arc::new(AgentSession::new(
        agent_provider,
        context.clone(),
        tools.clone(),
        environment.clone(),
        config.token_budget,
    ));

    let coach = Arc::new(Coach::new(
        history.clone(),
        analytics.clone(),
        make_provider(provider_settings.as_ref()),
    ));

    let predictor = Arc::new(Predictor::new(make_provider(provider_settings.as_ref())));
    let explainer = Arc::new(Explainer::new(make_provider(provider_settings.as_ref())));

    let mut subagents = SubagentRegistry::new(cwd.join(".claude").join("agents"), cwd.join(".roo"));
    for err in subagents.refresh() {
        tracing::warn!(error = %err, "subagent failed to load");
    }

    let mut engine = CompletionEngine::new(cwd.clone(), interpreter.clone());
    engine.subagent_names = subagents.iter().map(|d| d.id.clone()).collect();
    engine.fallback_command = config.completion_fallback_command.clone();

    let confirm: bish::shell::ConfirmFn = Arc::new(|prompt: &str| -> bool {
        print!("{prompt} ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    });

    let mut shell = Shell::new(
        ShellState::new(),
        history,
        analytics,
        coach,
        agent,
        subagents,
        MacroTable::new(),
        interpreter,
        config,
        confirm,
        explainer,
        cwd,
    );

    let exit_code = if let Some(command) = &cli.command {
        run_one_shot(&mut shell, command).await
    } else if !cli.scripts.is_empty() {
        run_scripts(&mut shell, &cli.scripts).await
    } else if std::io::stdin().is_terminal() {
        run_interactive(&mut shell, Arc::new(engine), Some(predictor), Some(context)).await
    } else {
        run_stdin_script(&mut shell).await
    };

    std::process::exit(exit_code);
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Human-readable logs to stderr, structured JSON logs to `gsh.log`
/// (SPEC_FULL §6 ambient logging), mirroring the teacher's
/// `EnvFilter`-driven registry but adding the JSON sink this crate needs
/// for persisted diagnostics.
fn init_logging(log_file: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent).context("create log directory")?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("open log file '{}'", log_file.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer().with_target(false).compact();
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(guard)
}

/// Rc-file discovery order (SPEC_FULL §6): `--rcfile` wins outright;
/// otherwise login shells source `/etc/profile` and `~/.gsh_profile` before
/// the two files every shell sources.
fn resolve_rc_files(login: bool, rcfile: Option<&Path>, home: &Path) -> Vec<PathBuf> {
    if let Some(path) = rcfile {
        return vec![path.to_path_buf()];
    }
    let mut files = Vec::new();
    if login {
        files.push(PathBuf::from("/etc/profile"));
        files.push(home.join(".gsh_profile"));
    }
    files.push(home.join(".gshrc"));
    files.push(home.join(".gshenv"));
    files
}

/// Best-effort sourcing: a missing file is skipped, a parse/exec failure is
/// logged and does not stop the remaining files (SPEC_FULL §7 "rc-file
/// errors are tolerated, never fatal").
async fn source_rc_files(interpreter: &dyn Interpreter, cwd: &Path, paths: &[PathBuf]) {
    for path in paths {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        if contents.trim().is_empty() {
            continue;
        }
        match interpreter.parse(&contents) {
            Ok(statement) => {
                if let Err(err) = interpreter.execute(&statement, cwd, &mut |_| {}).await {
                    tracing::warn!(path = %path.display(), error = %err, "rc-file execution failed");
                }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "rc-file parse failed");
            }
        }
    }
}

fn build_context_provider(history: Arc<HistoryStore>, cwd: &Path) -> Arc<ContextProvider> {
    let retrievers: Vec<Arc<dyn Retriever>> = vec![
        Arc::new(SystemInfoRetriever),
        Arc::new(WorkingDirectoryRetriever { cwd: cwd.to_path_buf() }),
        Arc::new(GitStatusRetriever { cwd: cwd.to_path_buf() }),
        Arc::new(HistoryConciseRetriever {
            history: history.clone(),
            cwd: cwd.to_path_buf(),
            limit: HISTORY_CONTEXT_LIMIT,
        }),
        Arc::new(HistoryVerboseRetriever {
            history,
            cwd: cwd.to_path_buf(),
            limit: HISTORY_CONTEXT_LIMIT,
        }),
    ];
    Arc::new(ContextProvider::new(retrievers))
}

/// Build a fresh boxed provider for one collaborator. Falls back to a
/// reply-less [`StaticProvider`] (graceful degradation, SPEC_FULL §7) when
/// no provider settings or no API key are available, rather than failing
/// startup over an absent LLM backend.
fn make_provider(settings: Option<&ProviderSettings>) -> Box<dyn Provider> {
    let Some(settings) = settings else {
        tracing::warn!("no provider configured, LLM-backed features will no-op");
        return Box::new(StaticProvider::new("none", Vec::new()));
    };
    let Ok(api_key) = std::env::var("BISH_API_KEY") else {
        tracing::warn!("BISH_API_KEY not set, LLM-backed features will no-op");
        return Box::new(StaticProvider::new(settings.model.clone(), Vec::new()));
    };
    let config = HttpProviderConfig {
        api_key,
        model: settings.model.clone(),
        api_base: settings.api_base.clone(),
        max_tokens: None,
        temperature: None,
        timeout: settings.timeout_tier.into(),
    };
    match HttpProvider::new(config) {
        Ok(provider) => Box::new(provider),
        Err(err) => {
            tracing::warn!(error = %err, "failed to build HTTP provider, falling back to no-op");
            Box::new(StaticProvider::new(settings.model.clone(), Vec::new()))
        }
    }
}

async fn run_one_shot(shell: &mut Shell, command: &str) -> i32 {
    match shell.dispatch_line(command).await {
        Ok(LoopOutcome::Exit(code)) => code,
        Ok(LoopOutcome::Continue) => shell.state.last_exit_code().max(0),
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

async fn run_scripts(shell: &mut Shell, scripts: &[PathBuf]) -> i32 {
    for path in scripts {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                eprintln!("bish: {}: {err}", path.display());
                return 1;
            }
        };
        if let Some(code) = run_lines(shell, contents.lines()).await {
            return code;
        }
    }
    0
}

async fn run_stdin_script(shell: &mut Shell) -> i32 {
    let mut buffer = String::new();
    use std::io::Read;
    if std::io::stdin().read_to_string(&mut buffer).is_err() {
        return 1;
    }
    run_lines(shell, buffer.lines()).await.unwrap_or(0)
}

/// Dispatch every line in order, stopping early on an interpreter-reported
/// exit (SPEC_FULL §4.1). Returns `Some(code)` only when the loop should
/// stop before reaching the end of input.
async fn run_lines<'a>(shell: &mut Shell, lines: impl Iterator<Item = &'a str>) -> Option<i32> {
    for line in lines {
        match shell.dispatch_line(line).await {
            Ok(LoopOutcome::Exit(code)) => return Some(code),
            Ok(LoopOutcome::Continue) => {}
            Err(err) => eprintln!("{err}"),
        }
    }
    None
}

async fn run_interactive(
    shell: &mut Shell,
    engine: Arc<CompletionEngine>,
    predictor: Option<Arc<Predictor>>,
    context: Option<Arc<ContextProvider>>,
) -> i32 {
    let helper = BishHelper {
        engine,
        predictor,
        context,
        runtime: tokio::runtime::Handle::current(),
    };

    let mut editor: rustyline::Editor<BishHelper, rustyline::history::FileHistory> =
        match rustyline::Editor::new() {
            Ok(e) => e,
            Err(err) => {
                eprintln!("bish: failed to start line editor: {err}");
                return 1;
            }
        };
    editor.set_helper(Some(helper));

    let history_path = home_dir().join(".local").join("share").join("bish").join("line_history");
    let _ = editor.load_history(&history_path);

    loop {
        match editor.readline("bish> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                match shell.dispatch_line(&line).await {
                    Ok(LoopOutcome::Exit(code)) => {
                        let _ = editor.save_history(&history_path);
                        return code;
                    }
                    Ok(LoopOutcome::Continue) => {}
                    Err(err) => eprintln!("{err}"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("bish: {err}");
                break;
            }
        }
    }

    let _ = editor.save_history(&history_path);
    0
}
