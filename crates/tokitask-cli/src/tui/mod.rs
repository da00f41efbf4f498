use std::{io, time::Duration};

use color_eyre::Result;
use crossterm::{
    event::{self, DisableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, Paragraph},
    Terminal,
};
use tokitask_core::tasks::{ensure_single_current, DayTask, UserData};
use uuid::Uuid;

/// Day view. `d` marks the current task done; `q` or `Esc` exits.
///
/// Returns the ids marked done so the caller can commit them.
pub fn launch(data: &UserData) -> Result<Vec<Uuid>> {
    // Guard restores the terminal even if we early-return.
    let _guard = TerminalGuard::enter()?;
    let mut terminal = _guard.terminal()?;
    let mut tasks = data.day_tasks.clone();
    let mut done = Vec::new();

    loop {
        terminal.draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(2)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(1),
                    Constraint::Length(3),
                ])
                .split(frame.area());

            let pending = tasks.iter().filter(|t| !t.completed).count();
            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "TokiTask",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!(
                    "  {pending} pending, day ends at {}",
                    data.end_of_day
                )),
            ]))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .title(Span::styled(
                        "Today",
                        Style::default()
                            .fg(Color::Green)
                            .add_modifier(Modifier::BOLD | Modifier::ITALIC),
                    )),
            );
            frame.render_widget(header, chunks[0]);

            let items: Vec<ListItem> = tasks.iter().map(task_item).collect();
            let body = List::new(items).block(Block::default().borders(Borders::ALL).title("Tasks"));
            frame.render_widget(body, chunks[1]);

            let footer = Paragraph::new(Line::from(vec![
                Span::styled("d", Style::default().fg(Color::Cyan)),
                Span::raw(" done   "),
                Span::styled("q", Style::default().fg(Color::Cyan)),
                Span::raw(" quit"),
            ]))
            .block(Block::default().borders(Borders::ALL).title("Controls"));
            frame.render_widget(footer, chunks[2]);
        })?;

        if event::poll(Duration::from_millis(150))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char('d') => {
                        if let Some(id) = complete_current(&mut tasks) {
                            done.push(id);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(done)
}

/// Mark the current task done locally and move the marker on.
fn complete_current(tasks: &mut [DayTask]) -> Option<Uuid> {
    let current = tasks.iter_mut().find(|t| t.is_current && !t.completed)?;
    current.completed = true;
    let id = current.task.id;
    ensure_single_current(tasks);
    Some(id)
}

fn task_item(day: &DayTask) -> ListItem<'_> {
    let (label, color) = if day.completed {
        ("[done]", Color::Green)
    } else if day.is_current {
        ("[now] ", Color::Cyan)
    } else {
        ("[todo]", Color::Yellow)
    };
    let mut name_style = Style::default().add_modifier(Modifier::BOLD);
    if day.completed {
        name_style = Style::default().add_modifier(Modifier::CROSSED_OUT);
    }
    let mut line = vec![
        Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(day.task.name.as_str(), name_style),
        Span::raw(format!("  {}", day.ai_duration)),
    ];
    if let Some(note) = &day.ai_note {
        line.push(Span::styled(
            format!("  {note}"),
            Style::default().fg(Color::DarkGray),
        ));
    }
    ListItem::new(Line::from(line))
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self)
    }

    fn terminal(&self) -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
        let backend = CrosstermBackend::new(io::stdout());
        Ok(Terminal::new(backend)?)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Errors cannot propagate out of Drop.
        if let Err(err) = disable_raw_mode() {
            eprintln!("failed to disable raw mode: {err}");
        }
        if let Err(err) = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture) {
            eprintln!("failed to restore terminal: {err}");
        }
    }
}
