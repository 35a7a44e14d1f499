// TUI widget modules for each screen zone and overlay.

pub mod board;
pub mod notice;
pub mod profile_bar;
pub mod result_modal;
pub mod status_bar;
pub mod waiting;

use ratatui::layout::{Constraint, Flex, Layout, Rect};

/// Compute a centered rectangle of the given size within `area`, clamped
/// to the available space.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let clamped_width = width.min(area.width);
    let clamped_height = height.min(area.height);

    let vertical = Layout::vertical([Constraint::Length(clamped_height)])
        .flex(Flex::Center)
        .split(area);

    let horizontal = Layout::horizontal([Constraint::Length(clamped_width)])
        .flex(Flex::Center)
        .split(vertical[0]);

    horizontal[0]
}
