//! Config TUI: a small ratatui key-value editor for `BishConfig`, launched
//! by the `@!config` control directive (SPEC_FULL §4.1; DESIGN.md Open
//! Question: kept in-core unlike the coach dashboard since it gates
//! `BishConfig` re-sync to the process environment). Widget composition
//! follows `tui/ui.rs`'s `Layout`/`Block`/`List` style.

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, ExecutableCommand};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::config::BishConfig;

/// One editable row: a label plus the field's current text form.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: &'static str,
    pub value: String,
}

/// Project the editable subset of `BishConfig` into a flat row list.
pub fn fields_of(config: &BishConfig) -> Vec<Field> {
    vec![
        Field { label: "default_provider", value: config.default_provider.clone() },
        Field { label: "token_budget", value: config.token_budget.to_string() },
        Field {
            label: "completion_fallback_command",
            value: config.completion_fallback_command.clone().unwrap_or_default(),
        },
        Field { label: "default_to_yes", value: config.default_to_yes.to_string() },
        Field { label: "coach.tip_ttl_hours", value: config.coach.tip_ttl_hours.to_string() },
        Field { label: "coach.tip_cache_capacity", value: config.coach.tip_cache_capacity.to_string() },
    ]
}

/// Apply one edited row back onto `config`. Unparseable numeric/bool text
/// is rejected (the row keeps its prior value); the caller re-renders from
/// `fields_of` afterward so a bad edit never stays visible as valid.
pub fn apply_field(config: &mut BishConfig, label: &str, value: &str) -> Result<(), String> {
    match label {
        "default_provider" => config.default_provider = value.to_string(),
        "token_budget" => {
            config.token_budget = value.parse().map_err(|_| format!("'{value}' is not a number"))?
        }
        "completion_fallback_command" => {
            config.completion_fallback_command = if value.is_empty() { None } else { Some(value.to_string()) }
        }
        "default_to_yes" => {
            config.default_to_yes = match value {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => return Err(format!("'{value}' is not a boolean")),
            }
        }
        "coach.tip_ttl_hours" => {
            config.coach.tip_ttl_hours = value.parse().map_err(|_| format!("'{value}' is not a number"))?
        }
        "coach.tip_cache_capacity" => {
            config.coach.tip_cache_capacity =
                value.parse().map_err(|_| format!("'{value}' is not a number"))?
        }
        other => return Err(format!("unknown field '{other}'")),
    }
    Ok(())
}

struct App {
    list_state: ListState,
    fields: Vec<Field>,
    editing: Option<String>,
    status: Option<String>,
}

impl App {
    fn new(config: &BishConfig) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        Self {
            list_state,
            fields: fields_of(config),
            editing: None,
            status: None,
        }
    }

    fn selected_label(&self) -> Option<&'static str> {
        self.list_state.selected().and_then(|i| self.fields.get(i)).map(|f| f.label)
    }
}

/// Runs the interactive config editor on the real terminal. Returns once
/// the user presses `q`/`Esc` in normal (non-editing) mode.
pub fn run(config: &mut BishConfig) -> Result<()> {
    enable_raw_mode().context("enable raw terminal mode")?;
    let mut stdout = std::io::stdout();
    stdout.execute(EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let result = run_loop(&mut terminal, config);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    result
}

fn run_loop(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, config: &mut BishConfig) -> Result<()> {
    let mut app = App::new(config);

    loop {
        terminal.draw(|f| draw(f, &app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };

        if let Some(buffer) = app.editing.clone() {
            match key.code {
                KeyCode::Enter => {
                    if let Some(label) = app.selected_label() {
                        match apply_field(config, label, &buffer) {
                            Ok(()) => app.status = None,
                            Err(message) => app.status = Some(message),
                        }
                        app.fields = fields_of(config);
                    }
                    app.editing = None;
                }
                KeyCode::Esc => app.editing = None,
                KeyCode::Backspace => {
                    let mut buffer = buffer;
                    buffer.pop();
                    app.editing = Some(buffer);
                }
                KeyCode::Char(c) => {
                    let mut buffer = buffer;
                    buffer.push(c);
                    app.editing = Some(buffer);
                }
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
            KeyCode::Down => select_next(&mut app),
            KeyCode::Up => select_prev(&mut app),
            KeyCode::Enter => {
                app.editing = app
                    .list_state
                    .selected()
                    .and_then(|i| app.fields.get(i))
                    .map(|f| f.value.clone());
            }
            _ => {}
        }
    }
}

fn select_next(app: &mut App) {
    let len = app.fields.len();
    let next = app.list_state.selected().map(|i| (i + 1) % len).unwrap_or(0);
    app.list_state.select(Some(next));
}

fn select_prev(app: &mut App) {
    let len = app.fields.len();
    let prev = app
        .list_state
        .selected()
        .map(|i| if i == 0 { len - 1 } else { i - 1 })
        .unwrap_or(0);
    app.list_state.select(Some(prev));
}

fn draw(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([ratatui::layout::Constraint::Min(0), Constraint::Length(3)])
        .split(f.area());

    let items: Vec<ListItem> = app
        .fields
        .iter()
        .map(|field| ListItem::new(format!("{:<28} {}", field.label, field.value)))
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" bish config "))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(list, chunks[0], &mut app.list_state.clone());

    let footer = if let Some(buffer) = &app.editing {
        format!("editing: {buffer}_  (Enter=save, Esc=cancel)")
    } else if let Some(status) = &app.status {
        format!("error: {status}")
    } else {
        "Enter=edit  ↑/↓=move  q=quit".to_string()
    };
    f.render_widget(Paragraph::new(footer).block(Block::default().borders(Borders::ALL)), chunks[1]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_of_reflects_current_config() {
        let config = BishConfig::default();
        let fields = fields_of(&config);
        let token_budget = fields.iter().find(|f| f.label == "token_budget").unwrap();
        assert_eq!(token_budget.value, "8000");
    }

    #[test]
    fn apply_field_updates_token_budget() {
        let mut config = BishConfig::default();
        apply_field(&mut config, "token_budget", "4096").unwrap();
        assert_eq!(config.token_budget, 4096);
    }

    #[test]
    fn apply_field_rejects_non_numeric_budget() {
        let mut config = BishConfig::default();
        let original = config.token_budget;
        assert!(apply_field(&mut config, "token_budget", "not a number").is_err());
        assert_eq!(config.token_budget, original);
    }

    #[test]
    fn apply_field_parses_boolean_aliases() {
        let mut config = BishConfig::default();
        apply_field(&mut config, "default_to_yes", "yes").unwrap();
        assert!(config.default_to_yes);
        apply_field(&mut config, "default_to_yes", "0").unwrap();
        assert!(!config.default_to_yes);
    }

    #[test]
    fn apply_field_rejects_unknown_label() {
        let mut config = BishConfig::default();
        assert!(apply_field(&mut config, "nonexistent", "x").is_err());
    }
}
