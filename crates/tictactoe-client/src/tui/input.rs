// Keyboard input handling and command dispatch.
//
// Translates crossterm key events into UserCommand messages for the app
// orchestrator, or into local ViewState changes (cursor movement, notice
// dismissal).

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use tictactoe_core::Phase;

use super::ViewState;
use crate::protocol::UserCommand;

/// Handle a keyboard event.
///
/// Returns `Some(UserCommand)` when the key press should be forwarded to the
/// app orchestrator. Returns `None` when it was handled locally or ignored.
pub fn handle_key(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    // Only process key press events (Windows also reports releases).
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL) && key_event.code == KeyCode::Char('c')
    {
        return Some(UserCommand::Quit);
    }

    // A notice blocks everything until dismissed.
    if view_state.notice.is_some() {
        if matches!(key_event.code, KeyCode::Enter | KeyCode::Esc) {
            view_state.notice = None;
        }
        return None;
    }

    if view_state.game.phase == Phase::Over {
        return match key_event.code {
            KeyCode::Char('n') | KeyCode::Char('N') => Some(UserCommand::NewGame),
            KeyCode::Char('q') | KeyCode::Char('Q') => Some(UserCommand::Quit),
            _ => None,
        };
    }

    match key_event.code {
        KeyCode::Up | KeyCode::Char('k') => {
            if view_state.cursor >= 3 {
                view_state.cursor -= 3;
            }
            None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if view_state.cursor < 6 {
                view_state.cursor += 3;
            }
            None
        }
        KeyCode::Left | KeyCode::Char('h') => {
            if view_state.cursor % 3 > 0 {
                view_state.cursor -= 1;
            }
            None
        }
        KeyCode::Right | KeyCode::Char('l') => {
            if view_state.cursor % 3 < 2 {
                view_state.cursor += 1;
            }
            None
        }
        KeyCode::Enter | KeyCode::Char(' ') => place_at_cursor(view_state),
        KeyCode::Char(digit @ '1'..='9') => {
            view_state.cursor = digit as usize - '1' as usize;
            place_at_cursor(view_state)
        }
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(UserCommand::Quit),
        _ => None,
    }
}

/// Clicks only mean something while a game is running; the session
/// decides whether the cell and turn allow it.
fn place_at_cursor(view_state: &ViewState) -> Option<UserCommand> {
    if view_state.game.phase == Phase::InProgress {
        Some(UserCommand::PlaceMark(view_state.cursor))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventState, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn ctrl_key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::CONTROL,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn in_progress() -> ViewState {
        let mut state = ViewState::default();
        state.game.phase = Phase::InProgress;
        state
    }

    // -- Cursor --

    #[test]
    fn cursor_starts_in_center_and_moves() {
        let mut state = in_progress();
        assert_eq!(state.cursor, 4);
        handle_key(key(KeyCode::Up), &mut state);
        assert_eq!(state.cursor, 1);
        handle_key(key(KeyCode::Char('h')), &mut state);
        assert_eq!(state.cursor, 0);
        handle_key(key(KeyCode::Char('j')), &mut state);
        assert_eq!(state.cursor, 3);
        handle_key(key(KeyCode::Right), &mut state);
        assert_eq!(state.cursor, 4);
    }

    #[test]
    fn cursor_stops_at_edges() {
        let mut state = in_progress();
        state.cursor = 0;
        handle_key(key(KeyCode::Up), &mut state);
        handle_key(key(KeyCode::Left), &mut state);
        assert_eq!(state.cursor, 0);

        state.cursor = 8;
        handle_key(key(KeyCode::Down), &mut state);
        handle_key(key(KeyCode::Char('l')), &mut state);
        assert_eq!(state.cursor, 8);

        // Right from the end of a row does not wrap to the next row.
        state.cursor = 2;
        handle_key(key(KeyCode::Right), &mut state);
        assert_eq!(state.cursor, 2);
    }

    // -- Placing --

    #[test]
    fn enter_and_space_place_at_cursor() {
        let mut state = in_progress();
        state.cursor = 7;
        assert_eq!(
            handle_key(key(KeyCode::Enter), &mut state),
            Some(UserCommand::PlaceMark(7))
        );
        assert_eq!(
            handle_key(key(KeyCode::Char(' ')), &mut state),
            Some(UserCommand::PlaceMark(7))
        );
    }

    #[test]
    fn digit_keys_place_directly() {
        let mut state = in_progress();
        assert_eq!(
            handle_key(key(KeyCode::Char('1')), &mut state),
            Some(UserCommand::PlaceMark(0))
        );
        assert_eq!(
            handle_key(key(KeyCode::Char('9')), &mut state),
            Some(UserCommand::PlaceMark(8))
        );
        assert_eq!(state.cursor, 8);
        assert_eq!(handle_key(key(KeyCode::Char('0')), &mut state), None);
    }

    #[test]
    fn placing_while_waiting_sends_nothing() {
        let mut state = ViewState::default();
        assert_eq!(handle_key(key(KeyCode::Enter), &mut state), None);
        assert_eq!(handle_key(key(KeyCode::Char('5')), &mut state), None);
    }

    // -- Game over --

    #[test]
    fn n_starts_new_game_only_when_over() {
        let mut state = in_progress();
        assert_eq!(handle_key(key(KeyCode::Char('n')), &mut state), None);

        state.game.phase = Phase::Over;
        assert_eq!(
            handle_key(key(KeyCode::Char('n')), &mut state),
            Some(UserCommand::NewGame)
        );
    }

    #[test]
    fn board_keys_are_inert_when_over() {
        let mut state = ViewState::default();
        state.game.phase = Phase::Over;
        assert_eq!(handle_key(key(KeyCode::Enter), &mut state), None);
        assert_eq!(handle_key(key(KeyCode::Char('3')), &mut state), None);
    }

    // -- Notice --

    #[test]
    fn notice_blocks_input_until_dismissed() {
        let mut state = in_progress();
        state.notice = Some("Please log in.".into());

        assert_eq!(handle_key(key(KeyCode::Char('5')), &mut state), None);
        assert_eq!(handle_key(key(KeyCode::Char('q')), &mut state), None);
        assert!(state.notice.is_some());

        assert_eq!(handle_key(key(KeyCode::Esc), &mut state), None);
        assert!(state.notice.is_none());

        assert_eq!(
            handle_key(key(KeyCode::Char('5')), &mut state),
            Some(UserCommand::PlaceMark(4))
        );
    }

    // -- Quit --

    #[test]
    fn q_quits_in_every_phase() {
        let mut state = ViewState::default();
        assert_eq!(
            handle_key(key(KeyCode::Char('q')), &mut state),
            Some(UserCommand::Quit)
        );
        state.game.phase = Phase::Over;
        assert_eq!(
            handle_key(key(KeyCode::Char('q')), &mut state),
            Some(UserCommand::Quit)
        );
    }

    #[test]
    fn ctrl_c_quits_even_with_notice() {
        let mut state = ViewState::default();
        state.notice = Some("boom".into());
        assert_eq!(
            handle_key(ctrl_key(KeyCode::Char('c')), &mut state),
            Some(UserCommand::Quit)
        );
    }

    #[test]
    fn release_events_are_ignored() {
        let mut state = in_progress();
        let mut event = key(KeyCode::Enter);
        event.kind = KeyEventKind::Release;
        assert_eq!(handle_key(event, &mut state), None);
    }
}
