// Status bar widget: connection indicator, players and whose turn it is.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use tictactoe_core::Phase;

use crate::protocol::{ConnectionStatus, GameSnapshot};
use crate::tui::ViewState;

/// Layout: [connection indicator] [players] | [turn or result]
pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let game = &state.game;
    let (dot, dot_color) = connection_indicator(game.connection);

    let mut spans = vec![
        Span::styled(format!(" {dot} "), Style::default().fg(dot_color)),
        Span::styled(players_text(game), Style::default().fg(Color::White)),
        Span::styled(" | ", Style::default().fg(Color::Gray)),
        Span::styled(
            turn_text(game),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
    ];
    if game.connection == ConnectionStatus::Disconnected {
        spans.push(Span::styled(
            "  (connection lost)",
            Style::default().fg(Color::Red),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

pub fn connection_indicator(status: ConnectionStatus) -> (&'static str, Color) {
    match status {
        ConnectionStatus::Connected => ("●", Color::Green),
        ConnectionStatus::Connecting => ("●", Color::Yellow),
        ConnectionStatus::Disconnected => ("●", Color::Red),
    }
}

/// "alice (X) vs bob (O)", or just the local name before pairing.
pub fn players_text(game: &GameSnapshot) -> String {
    let side = |s: Option<tictactoe_core::Side>| s.map(|s| format!(" ({s})")).unwrap_or_default();
    let local = format!("{}{}", game.local_name, side(game.local_side));
    match &game.opponent {
        Some(opponent) => format!(
            "{local} vs {opponent}{}",
            side(game.local_side.map(|s| s.opponent()))
        ),
        None => local,
    }
}

pub fn turn_text(game: &GameSnapshot) -> String {
    match game.phase {
        Phase::Waiting => "Waiting for opponent".to_string(),
        Phase::InProgress if game.is_local_turn => "Your turn".to_string(),
        Phase::InProgress => format!(
            "{}'s turn",
            game.opponent.as_deref().unwrap_or("Opponent")
        ),
        Phase::Over => game
            .result_text
            .clone()
            .unwrap_or_else(|| "Game over".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tictactoe_core::Side;

    fn game() -> GameSnapshot {
        GameSnapshot {
            local_name: "alice".into(),
            ..GameSnapshot::default()
        }
    }

    #[test]
    fn connection_indicator_colors() {
        assert_eq!(connection_indicator(ConnectionStatus::Connected).1, Color::Green);
        assert_eq!(connection_indicator(ConnectionStatus::Connecting).1, Color::Yellow);
        assert_eq!(connection_indicator(ConnectionStatus::Disconnected).1, Color::Red);
    }

    #[test]
    fn players_text_before_and_after_pairing() {
        let mut g = game();
        assert_eq!(players_text(&g), "alice");

        g.local_side = Some(Side::O);
        g.opponent = Some("bob".into());
        assert_eq!(players_text(&g), "alice (O) vs bob (X)");
    }

    #[test]
    fn turn_text_per_phase() {
        let mut g = game();
        assert_eq!(turn_text(&g), "Waiting for opponent");

        g.phase = Phase::InProgress;
        g.opponent = Some("bob".into());
        assert_eq!(turn_text(&g), "bob's turn");
        g.is_local_turn = true;
        assert_eq!(turn_text(&g), "Your turn");

        g.phase = Phase::Over;
        g.result_text = Some("It's a draw!".into());
        assert_eq!(turn_text(&g), "It's a draw!");
    }

    #[test]
    fn render_does_not_panic_with_defaults() {
        let backend = ratatui::backend::TestBackend::new(80, 1);
        let mut terminal = ratatui::Terminal::new(backend).unwrap();
        let state = ViewState::default();
        terminal
            .draw(|frame| render(frame, frame.area(), &state))
            .unwrap();
    }
}
