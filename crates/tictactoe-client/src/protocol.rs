// Messages between the app orchestrator and the TUI.
//
// The app pushes `UiUpdate`s to the render loop; the render loop sends
// `UserCommand`s back. Neither side shares mutable state with the other.

use tictactoe_core::{Board, BoardEvaluator, Phase, Profile, Session, Side, WinLine};

/// State of the link to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Render-ready view of the session, derived after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    pub local_name: String,
    pub game_id: Option<String>,
    pub opponent: Option<String>,
    pub phase: Phase,
    pub local_side: Option<Side>,
    pub current_turn: Option<Side>,
    pub is_local_turn: bool,
    pub board: Board,
    /// Triple to strike through once somebody has won.
    pub win_line: Option<WinLine>,
    pub result_text: Option<String>,
    pub over_reason: Option<String>,
    pub connection: ConnectionStatus,
}

impl Default for GameSnapshot {
    fn default() -> Self {
        GameSnapshot {
            local_name: String::new(),
            game_id: None,
            opponent: None,
            phase: Phase::Waiting,
            local_side: None,
            current_turn: None,
            is_local_turn: false,
            board: Board::new(),
            win_line: None,
            result_text: None,
            over_reason: None,
            connection: ConnectionStatus::Connecting,
        }
    }
}

impl GameSnapshot {
    pub fn from_session(
        session: &Session,
        evaluator: &BoardEvaluator,
        connection: ConnectionStatus,
    ) -> Self {
        let evaluation = evaluator.evaluate(session.board());
        GameSnapshot {
            local_name: session.local_name().to_string(),
            game_id: session.id().map(str::to_string),
            opponent: session.opponent().map(str::to_string),
            phase: session.phase(),
            local_side: session.local_side(),
            current_turn: session.current_turn(),
            is_local_turn: session.is_local_turn(),
            board: *session.board(),
            win_line: evaluation.line,
            result_text: session.result_text(),
            over_reason: session.over_reason().map(str::to_string),
            connection,
        }
    }
}

/// Updates pushed from the app orchestrator to the TUI.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    /// The session or connection changed.
    Game(Box<GameSnapshot>),
    /// Profile counters arrived from the relay's HTTP API.
    Profile(Profile),
    /// A relay-reported error; shown verbatim until dismissed.
    Notice(String),
}

/// Commands sent from the TUI to the app orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Place the local mark on a cell (0-8).
    PlaceMark(usize),
    /// Leave the finished game and ask the relay for a new pairing.
    NewGame,
    Quit,
}
