// Screen layout: panel arrangement and sizing.
//
// +--------------------------------------------------+
// | Status Bar (1 row)                               |
// | Profile Bar (1 row)                              |
// +--------------------------------------------------+
// |                                                  |
// |                 Board (centered)                 |
// |                                                  |
// +--------------------------------------------------+
// | Help Bar (1 row)                                 |
// +--------------------------------------------------+

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Resolved screen areas for each zone.
#[derive(Debug, Clone)]
pub struct AppLayout {
    /// Players, turn and connection indicator.
    pub status_bar: Rect,
    /// Lifetime counters from the relay.
    pub profile_bar: Rect,
    /// Everything between the bars; the board centers itself inside.
    pub board: Rect,
    /// Keyboard shortcut hints.
    pub help_bar: Rect,
}

pub fn build_layout(area: Rect) -> AppLayout {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Length(1), // profile bar
            Constraint::Min(9),    // board
            Constraint::Length(1), // help bar
        ])
        .split(area);

    AppLayout {
        status_bar: vertical[0],
        profile_bar: vertical[1],
        board: vertical[2],
        help_bar: vertical[3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_area() -> Rect {
        Rect::new(0, 0, 160, 50)
    }

    #[test]
    fn layout_all_rects_nonzero() {
        let layout = build_layout(test_area());
        let rects = [
            ("status_bar", layout.status_bar),
            ("profile_bar", layout.profile_bar),
            ("board", layout.board),
            ("help_bar", layout.help_bar),
        ];
        for (name, rect) in &rects {
            assert!(
                rect.width > 0 && rect.height > 0,
                "{} has zero area: {:?}",
                name,
                rect
            );
        }
    }

    #[test]
    fn layout_bars_are_one_row() {
        let layout = build_layout(test_area());
        assert_eq!(layout.status_bar.height, 1);
        assert_eq!(layout.profile_bar.height, 1);
        assert_eq!(layout.help_bar.height, 1);
    }

    #[test]
    fn board_takes_the_remaining_rows() {
        let layout = build_layout(test_area());
        assert_eq!(layout.board.height, 47);
        assert!(layout.profile_bar.y < layout.board.y);
        assert!(layout.board.y < layout.help_bar.y);
    }

    #[test]
    fn layout_small_terminal_still_valid() {
        let layout = build_layout(Rect::new(0, 0, 30, 12));
        assert!(layout.board.height >= 9);
        assert!(layout.help_bar.height > 0);
    }
}
