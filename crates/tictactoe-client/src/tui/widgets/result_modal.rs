// Result overlay shown once the game is over.

use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use tictactoe_core::protocol::REASON_OPPONENT_DISCONNECTED;

use super::centered_rect;
use crate::tui::ViewState;

const DIALOG_WIDTH: u16 = 36;
const DIALOG_HEIGHT: u16 = 7;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let dialog_area = centered_rect(DIALOG_WIDTH, DIALOG_HEIGHT, area);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(Span::styled(
            " Game over ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));

    let paragraph = Paragraph::new(result_lines(state))
        .alignment(Alignment::Center)
        .block(block)
        .style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, dialog_area);
}

pub fn result_lines(state: &ViewState) -> Vec<Line<'static>> {
    let headline = state
        .game
        .result_text
        .clone()
        .unwrap_or_else(|| "Game over".to_string());

    let mut lines = vec![Line::from(Span::styled(
        headline,
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    ))];
    match state.game.over_reason.as_deref() {
        Some(REASON_OPPONENT_DISCONNECTED) => {
            lines.push(Line::from("Your opponent left the game."))
        }
        Some(other) => lines.push(Line::from(other.to_string())),
        None => lines.push(Line::from("")),
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("n", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        Span::raw(": New game   "),
        Span::styled("q", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        Span::raw(": Quit"),
    ]));
    lines
}
