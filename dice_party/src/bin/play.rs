use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, terminal,
};
use dice_game::{Condition, RoundRecord};
use dice_party::{
    round_engine::{EngineError, GameSnapshot, RoundEngineHandle, RoundEngineModule, RoundEvent},
    Conf,
};
use ratatui::{
    backend::CrosstermBackend,
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

#[derive(Parser, Debug)]
#[command(version, about = "Play the dice game in the terminal", long_about = None)]
pub struct Args {
    #[arg(long, default_value = "config.toml")]
    pub config_file: Vec<String>,
}

struct PlayUiState {
    snapshot: GameSnapshot,
    /// Last notification shown under the controls (rejections, outcomes).
    status: Option<String>,
    should_quit: bool,
    redraw: bool,
}

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Conf::new(args.config_file).context("Failed to load config")?;
    // Don't setup tracing, as we render a custom UI

    let (engine, handle) = RoundEngineModule::build(&config);
    let engine_task = tokio::spawn(engine.run());

    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal::enable_raw_mode()?;
    execute!(io::stdout(), terminal::EnterAlternateScreen)?;

    let res = run_ui(&mut terminal, &handle).await;

    terminal::disable_raw_mode()?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen)?;

    drop(handle);
    engine_task.await.context("round engine task")??;
    res
}

async fn run_ui(terminal: &mut Tui, handle: &RoundEngineHandle) -> Result<()> {
    let mut events = handle.subscribe();
    let mut ui = PlayUiState {
        snapshot: handle.snapshot().await?,
        status: None,
        should_quit: false,
        redraw: true,
    };

    let mut interval = tokio::time::interval(Duration::from_millis(100));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(RoundEvent::StateUpdated { state, .. }) => ui.snapshot = state,
                    Ok(RoundEvent::RoundResolved { record }) => {
                        ui.status = Some(outcome_line(&record));
                    }
                    Err(RecvError::Lagged(_)) => {
                        ui.snapshot = handle.snapshot().await?;
                    }
                    Err(RecvError::Closed) => break,
                }
                ui.redraw = true;
            }
            _ = interval.tick() => {
                if ui.should_quit {
                    break;
                }
                if ui.redraw {
                    render_tui(terminal, &ui)?;
                    ui.redraw = false;
                }
            }
            Ok(true) = async { event::poll(Duration::from_secs(0)) } => {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        handle_key(handle, &mut ui, key.code, key.modifiers).await?;
                    }
                }
                if ui.redraw {
                    render_tui(terminal, &ui)?;
                    ui.redraw = false;
                }
            }
        }
    }
    Ok(())
}

async fn handle_key(
    handle: &RoundEngineHandle,
    ui: &mut PlayUiState,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Result<()> {
    let state = &ui.snapshot.state;
    let result = match code {
        KeyCode::Char('q') | KeyCode::Esc => {
            ui.should_quit = true;
            return Ok(());
        }
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
            ui.should_quit = true;
            return Ok(());
        }
        KeyCode::Char(digit) if digit.is_ascii_digit() => {
            let mut input = state.threshold_input.clone();
            input.push(digit);
            handle.set_threshold(input).await
        }
        KeyCode::Backspace => {
            let mut input = state.threshold_input.clone();
            input.pop();
            handle.set_threshold(input).await
        }
        KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
            handle.set_condition(state.condition.toggled()).await
        }
        KeyCode::Enter => {
            let res = handle
                .start_round(state.threshold_input.clone(), state.condition)
                .await;
            if res.is_ok() {
                ui.status = Some("Rolling...".to_string());
            }
            res
        }
        _ => return Ok(()),
    };

    match result {
        Ok(snapshot) => ui.snapshot = snapshot,
        Err(EngineError::Round(e)) => ui.status = Some(e.to_string()),
        Err(e) => return Err(e.into()),
    }
    ui.redraw = true;
    Ok(())
}

fn outcome_line(record: &RoundRecord) -> String {
    format!(
        "Rolled {}: {}",
        record.roll,
        if record.won { "Win!" } else { "Loss" }
    )
}

fn outcome_color(won: bool) -> Color {
    if won {
        Color::Green
    } else {
        Color::Red
    }
}

/// Local wall-clock `HH:MM:SS` for a millisecond timestamp.
fn clock(ms: u64) -> String {
    clock_in(ms, &Local)
}

fn clock_in<Tz: TimeZone>(ms: u64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|utc| utc.with_timezone(tz).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn render_tui(terminal: &mut Tui, ui: &PlayUiState) -> Result<()> {
    let state = &ui.snapshot.state;
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(f.area());

        let condition_span = |c: Condition| {
            let label = match c {
                Condition::GreaterThan => " More ",
                Condition::LessThan => " Less ",
            };
            if c == state.condition {
                Span::styled(label, Style::default().bg(Color::Blue).fg(Color::White))
            } else {
                Span::raw(label)
            }
        };

        let trigger = if state.is_rolling() {
            Span::styled("[ Rolling... ]", Style::default().fg(Color::Yellow))
        } else if ui.snapshot.can_roll {
            Span::styled("[ Enter: Play ]", Style::default().add_modifier(Modifier::BOLD))
        } else {
            Span::styled("[ Play ]", Style::default().fg(Color::DarkGray))
        };

        let mut lines = vec![
            Line::from(vec![
                Span::raw("Threshold (1-100): "),
                Span::styled(
                    state.threshold_input.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(""),
            Line::from(vec![
                Span::raw("Condition: "),
                condition_span(Condition::GreaterThan),
                Span::raw(" "),
                condition_span(Condition::LessThan),
            ]),
            Line::from(""),
            Line::from(trigger),
            Line::from(""),
        ];

        // Colour comes from the record this roll created, never from an older entry.
        if let (Some(roll), Some(latest)) = (state.last_roll, state.latest()) {
            let color = outcome_color(latest.won);
            lines.push(Line::from(Span::styled(
                format!("Result: {}", roll),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(Span::styled(
                if latest.won { "Win!" } else { "Loss" },
                Style::default().fg(color),
            )));
        }
        if let Some(status) = &ui.status {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                status.clone(),
                Style::default().fg(Color::Gray),
            )));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "digits/backspace: threshold  ←/→: condition  q: quit",
            Style::default().fg(Color::DarkGray),
        )));

        let settings = Paragraph::new(lines)
            .block(Block::default().title("Dice Game").borders(Borders::ALL));
        f.render_widget(settings, chunks[0]);

        let items: Vec<ListItem> = if state.history.is_empty() {
            vec![ListItem::new("No games yet. Play the first one!")]
        } else {
            state
                .history
                .iter()
                .map(|record| {
                    ListItem::new(Line::from(vec![
                        Span::styled(
                            format!("{} ", clock(record.occurred_at)),
                            Style::default().fg(Color::DarkGray),
                        ),
                        Span::styled(
                            if record.won { "[WIN]  " } else { "[LOSS] " },
                            Style::default().fg(outcome_color(record.won)),
                        ),
                        Span::raw(record.to_string()),
                    ]))
                })
                .collect()
        };
        let history =
            List::new(items).block(Block::default().title("History").borders(Borders::ALL));
        f.render_widget(history, chunks[1]);
    })?;
    Ok(())
}
