// Profile bar widget: lifetime counters from the relay.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use tictactoe_core::Profile;

use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let style = match state.profile {
        Some(_) => Style::default().fg(Color::White),
        None => Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::ITALIC),
    };
    let line = Line::from(Span::styled(profile_text(state.profile.as_ref()), style));
    frame.render_widget(Paragraph::new(line), area);
}

/// Stays on "Loading profile..." until counters arrive; a failed fetch
/// never replaces it.
pub fn profile_text(profile: Option<&Profile>) -> String {
    match profile {
        None => " Loading profile...".to_string(),
        Some(p) => format!(
            " Played {} | Wins {} | Losses {} | Draws {}",
            p.game_played, p.wins, p.losses, p.draws
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_until_profile_arrives() {
        assert_eq!(profile_text(None), " Loading profile...");
    }

    #[test]
    fn counters_are_listed() {
        let profile = Profile {
            game_played: 5,
            wins: 3,
            losses: 1,
            draws: 1,
        };
        assert_eq!(
            profile_text(Some(&profile)),
            " Played 5 | Wins 3 | Losses 1 | Draws 1"
        );
    }
}
