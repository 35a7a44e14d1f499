// Shared game model: the board evaluator, the client session state machine,
// and the wire protocol spoken between clients and the relay.

pub mod board;
pub mod protocol;
pub mod seed;
pub mod session;

pub use board::{Board, BoardEvaluator, Evaluation, Outcome, Side, WinLine, CELL_COUNT};
pub use protocol::{ClientMessage, GameOverResult, Profile, ServerMessage};
pub use session::{GameResult, Move, Phase, Session, SessionError};
