// Waiting screen shown until an opponent is paired.

use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use super::centered_rect;
use crate::protocol::{ConnectionStatus, GameSnapshot};
use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let dialog_area = centered_rect(40, 6, area);
    let paragraph = Paragraph::new(waiting_lines(&state.game))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
    frame.render_widget(paragraph, dialog_area);
}

pub fn waiting_lines(game: &GameSnapshot) -> Vec<Line<'static>> {
    let headline = match game.connection {
        ConnectionStatus::Connecting => "Connecting to relay...",
        ConnectionStatus::Connected => "Waiting for opponent...",
        ConnectionStatus::Disconnected => "Connection lost.",
    };
    let mut lines = vec![Line::styled(
        headline,
        Style::default().add_modifier(Modifier::BOLD),
    )];
    match (&game.game_id, game.connection) {
        (_, ConnectionStatus::Disconnected) => {
            lines.push(Line::from("Press q to quit."));
        }
        (Some(id), _) => lines.push(Line::styled(
            format!("Game {id}"),
            Style::default().fg(Color::Gray),
        )),
        (None, _) => {}
    }
    lines
}
