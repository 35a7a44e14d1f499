// Board widget: the 3x3 grid with cursor and winning-line highlight.

use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use tictactoe_core::{Phase, Side};

use super::centered_rect;
use crate::tui::ViewState;

/// Size of one cell including its border.
pub const CELL_WIDTH: u16 = 7;
pub const CELL_HEIGHT: u16 = 3;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let board_area = centered_rect(CELL_WIDTH * 3, CELL_HEIGHT * 3, area);
    let rows = Layout::vertical([Constraint::Length(CELL_HEIGHT); 3]).split(board_area);

    for (r, row) in rows.iter().enumerate() {
        let cols = Layout::horizontal([Constraint::Length(CELL_WIDTH); 3]).split(*row);
        for (c, cell_area) in cols.iter().enumerate() {
            let index = r * 3 + c;
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(border_style(index, state));
            let paragraph = Paragraph::new(cell_span(index, state))
                .alignment(Alignment::Center)
                .block(block);
            frame.render_widget(paragraph, *cell_area);
        }
    }
}

/// Text for a cell: its mark, or the dimmed 1-9 shortcut when empty.
pub fn cell_span(index: usize, state: &ViewState) -> Span<'static> {
    let on_win_line = is_on_win_line(index, state);
    match state.game.board.get(index) {
        Some(side) => {
            let mut style = Style::default()
                .fg(mark_color(side))
                .add_modifier(Modifier::BOLD);
            if on_win_line {
                style = style.fg(Color::Black).bg(Color::Green);
            }
            Span::styled(side.as_str(), style)
        }
        None => Span::styled(
            (index + 1).to_string(),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::DIM),
        ),
    }
}

/// Highlight the cursor while a game runs, and the winning triple after.
pub fn border_style(index: usize, state: &ViewState) -> Style {
    if is_on_win_line(index, state) {
        Style::default().fg(Color::Green)
    } else if state.game.phase == Phase::InProgress && index == state.cursor {
        let color = if state.game.is_local_turn {
            Color::Yellow
        } else {
            Color::Gray
        };
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

pub fn mark_color(side: Side) -> Color {
    match side {
        Side::X => Color::Cyan,
        Side::O => Color::Magenta,
    }
}

fn is_on_win_line(index: usize, state: &ViewState) -> bool {
    state
        .game
        .win_line
        .is_some_and(|line| line.cells().contains(&index))
}
