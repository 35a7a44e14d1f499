// Terminal UI: layout, input handling, and widget rendering.
//
// The TUI owns a `ViewState` that mirrors what the app orchestrator last
// reported. The orchestrator pushes `UiUpdate` messages over an mpsc channel;
// the TUI applies them to `ViewState` and re-renders at ~30 fps.

pub mod input;
pub mod layout;
pub mod widgets;

use std::time::Duration;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;
use tokio::sync::mpsc;

use tictactoe_core::{Phase, Profile};

use crate::protocol::{GameSnapshot, UiUpdate, UserCommand};

use layout::{build_layout, AppLayout};

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// TUI-local state for rendering.
#[derive(Debug, Clone)]
pub struct ViewState {
    /// Latest session snapshot from the app orchestrator.
    pub game: GameSnapshot,
    /// Profile counters; `None` while loading.
    pub profile: Option<Profile>,
    /// Relay error awaiting dismissal.
    pub notice: Option<String>,
    /// Highlighted cell (0-8).
    pub cursor: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            game: GameSnapshot::default(),
            profile: None,
            notice: None,
            cursor: 4,
        }
    }
}

/// Apply a single UiUpdate to the ViewState.
pub fn apply_ui_update(state: &mut ViewState, update: UiUpdate) {
    match update {
        UiUpdate::Game(snapshot) => {
            state.game = *snapshot;
        }
        UiUpdate::Profile(profile) => {
            state.profile = Some(profile);
        }
        UiUpdate::Notice(message) => {
            state.notice = Some(message);
        }
    }
}

// ---------------------------------------------------------------------------
// Render frame
// ---------------------------------------------------------------------------

fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());

    widgets::status_bar::render(frame, layout.status_bar, state);
    widgets::profile_bar::render(frame, layout.profile_bar, state);
    match state.game.phase {
        Phase::Waiting => widgets::waiting::render(frame, layout.board, state),
        Phase::InProgress => widgets::board::render(frame, layout.board, state),
        Phase::Over => {
            widgets::board::render(frame, layout.board, state);
            widgets::result_modal::render(frame, layout.board, state);
        }
    }
    render_help_bar(frame, &layout, state);

    if let Some(message) = &state.notice {
        widgets::notice::render(frame, frame.area(), message);
    }
}

fn render_help_bar(frame: &mut Frame, layout: &AppLayout, state: &ViewState) {
    let paragraph = Paragraph::new(Line::from(vec![Span::styled(
        help_text(state),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::DIM),
    )]))
    .style(Style::default().bg(Color::DarkGray));
    frame.render_widget(paragraph, layout.help_bar);
}

pub fn help_text(state: &ViewState) -> &'static str {
    if state.notice.is_some() {
        return " Enter/Esc:Dismiss | Ctrl+C:Quit";
    }
    match state.game.phase {
        Phase::Waiting => " q:Quit",
        Phase::InProgress => " arrows/hjkl:Move | Enter/Space:Place | 1-9:Place cell | q:Quit",
        Phase::Over => " n:New game | q:Quit",
    }
}

// ---------------------------------------------------------------------------
// Main TUI loop
// ---------------------------------------------------------------------------

/// Run the TUI event loop until the user quits or the app goes away.
///
/// Initializes the terminal, installs a panic hook that restores it, then
/// selects over UI updates, keyboard input and render ticks.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        ratatui::restore();
        original_hook(panic_info);
    }));

    let mut view_state = ViewState::default();
    let mut event_stream = EventStream::new();

    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(ui_update) => apply_ui_update(&mut view_state, ui_update),
                    None => break,
                }
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        if let Some(cmd) = input::handle_key(key_event, &mut view_state) {
                            let quit = cmd == UserCommand::Quit;
                            let _ = cmd_tx.send(cmd).await;
                            if quit {
                                break;
                            }
                        }
                    }
                    Some(Ok(_)) => {
                        // Mouse, resize, focus.
                    }
                    Some(Err(_)) | None => break,
                }
            }

            _ = render_tick.tick() => {
                terminal.draw(|frame| render_frame(frame, &view_state))?;
            }
        }
    }

    ratatui::restore();

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
