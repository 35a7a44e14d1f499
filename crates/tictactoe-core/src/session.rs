// Client-side game session state machine.
//
// A `Session` is the single authoritative record of one match as seen from
// one client. It is mutated only through the transition methods below, each
// of which corresponds to one local action or one inbound relay event.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::board::{Board, BoardError, Side};
use crate::protocol::GameOverResult;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Joined or joining, no opponent yet.
    Waiting,
    /// Both sides assigned, turn-taking active.
    InProgress,
    /// Win or draw reported by the relay.
    Over,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Waiting => "waiting",
            Phase::InProgress => "in_progress",
            Phase::Over => "over",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    Pending,
    Draw,
    Win { winner: String },
}

/// A single placed mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub cell: usize,
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while the session is {phase}")]
    IllegalTransition { action: &'static str, phase: Phase },

    #[error("move #{seq} arrived out of sequence (expected #{expected})")]
    OutOfSequence { seq: u32, expected: u32 },

    #[error("remote move rejected: {0}")]
    InvalidRemoteMove(#[from] BoardError),

    #[error("game_over reported a win without naming the winner")]
    MissingWinner,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    local_name: String,
    id: Option<String>,
    opponent: Option<String>,
    phase: Phase,
    local_side: Option<Side>,
    remote_side: Option<Side>,
    current_turn: Option<Side>,
    board: Board,
    result: GameResult,
    over_reason: Option<String>,
    moves_applied: u32,
}

impl Session {
    /// A fresh session in `Waiting` for the player called `local_name`.
    pub fn new(local_name: impl Into<String>) -> Self {
        Session {
            local_name: local_name.into(),
            id: None,
            opponent: None,
            phase: Phase::Waiting,
            local_side: None,
            remote_side: None,
            current_turn: None,
            board: Board::new(),
            result: GameResult::Pending,
            over_reason: None,
            moves_applied: 0,
        }
    }

    // -- read-only views ---------------------------------------------------

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn opponent(&self) -> Option<&str> {
        self.opponent.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn local_side(&self) -> Option<Side> {
        self.local_side
    }

    pub fn remote_side(&self) -> Option<Side> {
        self.remote_side
    }

    pub fn current_turn(&self) -> Option<Side> {
        self.current_turn
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn result(&self) -> &GameResult {
        &self.result
    }

    /// Free-form reason the relay attached to `game_over`, if any.
    pub fn over_reason(&self) -> Option<&str> {
        self.over_reason.as_deref()
    }

    pub fn moves_applied(&self) -> u32 {
        self.moves_applied
    }

    pub fn is_local_turn(&self) -> bool {
        self.phase == Phase::InProgress
            && self.local_side.is_some()
            && self.current_turn == self.local_side
    }

    /// Human-readable result line, `None` until the game is over.
    ///
    /// The relay names the winner by account, which need not match the
    /// local display name, so a win is ours unless the opponent won.
    pub fn result_text(&self) -> Option<String> {
        match &self.result {
            GameResult::Pending => None,
            GameResult::Draw => Some("It's a draw!".to_string()),
            GameResult::Win { winner } => {
                let opponent_won = match &self.opponent {
                    Some(opponent) => winner == opponent,
                    None => *winner != self.local_name,
                };
                if opponent_won {
                    Some(format!("{winner} won!"))
                } else {
                    Some("You won!".to_string())
                }
            }
        }
    }

    // -- transitions -------------------------------------------------------

    /// `game_joined`: the relay created a game for us; we play X and wait.
    pub fn joined(&mut self, session_id: impl Into<String>) -> Result<(), SessionError> {
        self.require(Phase::Waiting, "join")?;
        self.id = Some(session_id.into());
        self.local_side = Some(Side::X);
        debug!(id = ?self.id, "session joined, waiting for opponent");
        Ok(())
    }

    /// `opponent_joined`: someone joined our waiting game.
    pub fn opponent_joined(&mut self, name: impl Into<String>) -> Result<(), SessionError> {
        self.require(Phase::Waiting, "accept an opponent")?;
        let local = *self.local_side.get_or_insert(Side::X);
        self.remote_side = Some(local.opponent());
        self.opponent = Some(name.into());
        self.current_turn = Some(Side::X);
        self.phase = Phase::InProgress;
        debug!(opponent = ?self.opponent, "opponent joined, game in progress");
        Ok(())
    }

    /// `game_started`: we were paired into someone else's waiting game and
    /// play O.
    pub fn game_started(
        &mut self,
        session_id: impl Into<String>,
        opponent: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.require(Phase::Waiting, "start a game")?;
        self.id = Some(session_id.into());
        self.local_side = Some(Side::O);
        self.remote_side = Some(Side::X);
        self.opponent = Some(opponent.into());
        self.current_turn = Some(Side::X);
        self.phase = Phase::InProgress;
        debug!(id = ?self.id, opponent = ?self.opponent, "game started as O");
        Ok(())
    }

    /// Local click on `cell`. Returns the move to send to the relay, or
    /// `None` when the click is not a legal move right now. Illegal clicks
    /// are not errors and leave the session untouched.
    pub fn local_move(&mut self, cell: usize) -> Option<Move> {
        if !self.is_local_turn() {
            return None;
        }
        let side = self.local_side?;
        self.board.place(cell, side).ok()?;
        self.moves_applied += 1;
        self.current_turn = Some(side.opponent());
        debug!(cell, %side, "local move applied");
        Some(Move { cell, side })
    }

    /// `move_made`: the opponent placed a mark.
    ///
    /// The turn is not checked; the relay only forwards moves it accepted.
    /// When `seq` is present it must be the next move number.
    pub fn remote_move(&mut self, cell: usize, seq: Option<u32>) -> Result<Move, SessionError> {
        self.require(Phase::InProgress, "apply a remote move")?;
        let expected = self.moves_applied + 1;
        if let Some(seq) = seq {
            if seq != expected {
                return Err(SessionError::OutOfSequence { seq, expected });
            }
        }
        let side = self
            .remote_side
            .or_else(|| self.local_side.map(Side::opponent))
            .unwrap_or(Side::O);
        self.board.place(cell, side)?;
        self.moves_applied = expected;
        self.current_turn = Some(side.opponent());
        debug!(cell, %side, "remote move applied");
        Ok(Move { cell, side })
    }

    /// `game_over`: the relay decided the game.
    pub fn game_over(
        &mut self,
        result: GameOverResult,
        winner: Option<String>,
        reason: Option<String>,
    ) -> Result<(), SessionError> {
        self.require(Phase::InProgress, "finish the game")?;
        self.result = match result {
            GameOverResult::Draw => GameResult::Draw,
            GameOverResult::Win => GameResult::Win {
                winner: winner.ok_or(SessionError::MissingWinner)?,
            },
        };
        self.over_reason = reason;
        self.phase = Phase::Over;
        debug!(result = ?self.result, "game over");
        Ok(())
    }

    /// Explicit new-game action: back to an empty `Waiting` session. The
    /// caller is responsible for requesting a new pairing.
    pub fn new_game(&mut self) -> Result<(), SessionError> {
        self.require(Phase::Over, "start a new game")?;
        *self = Session::new(std::mem::take(&mut self.local_name));
        debug!("session reset for a new game");
        Ok(())
    }

    fn require(&self, phase: Phase, action: &'static str) -> Result<(), SessionError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(SessionError::IllegalTransition {
                action,
                phase: self.phase,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: alice created the game and bob joined it.
    fn first_joiner() -> Session {
        let mut s = Session::new("alice");
        s.joined("g1").unwrap();
        s.opponent_joined("bob").unwrap();
        s
    }

    /// Helper: bob was paired into alice's game.
    fn second_joiner() -> Session {
        let mut s = Session::new("bob");
        s.game_started("g1", "alice").unwrap();
        s
    }

    #[test]
    fn new_session_is_waiting_and_empty() {
        let s = Session::new("alice");
        assert_eq!(s.phase(), Phase::Waiting);
        assert_eq!(s.board().filled(), 0);
        assert_eq!(s.result(), &GameResult::Pending);
        assert!(s.local_side().is_none());
        assert!(s.result_text().is_none());
    }

    #[test]
    fn joined_assigns_x_and_keeps_waiting() {
        let mut s = Session::new("alice");
        s.joined("g1").unwrap();
        assert_eq!(s.id(), Some("g1"));
        assert_eq!(s.local_side(), Some(Side::X));
        assert_eq!(s.phase(), Phase::Waiting);
    }

    #[test]
    fn opponent_joined_starts_game_with_x_to_move() {
        let s = first_joiner();
        assert_eq!(s.phase(), Phase::InProgress);
        assert_eq!(s.local_side(), Some(Side::X));
        assert_eq!(s.remote_side(), Some(Side::O));
        assert_eq!(s.current_turn(), Some(Side::X));
        assert_eq!(s.opponent(), Some("bob"));
        assert!(s.is_local_turn());
    }

    #[test]
    fn game_started_assigns_o() {
        let s = second_joiner();
        assert_eq!(s.phase(), Phase::InProgress);
        assert_eq!(s.local_side(), Some(Side::O));
        assert_eq!(s.remote_side(), Some(Side::X));
        assert_eq!(s.current_turn(), Some(Side::X));
        assert!(!s.is_local_turn());
    }

    #[test]
    fn local_move_on_own_turn_places_and_flips() {
        let mut s = first_joiner();
        let mv = s.local_move(4).expect("move should be accepted");
        assert_eq!(mv, Move { cell: 4, side: Side::X });
        assert_eq!(s.board().get(4), Some(Side::X));
        assert_eq!(s.current_turn(), Some(Side::O));
        assert_eq!(s.moves_applied(), 1);
    }

    #[test]
    fn local_move_out_of_turn_is_ignored() {
        let mut s = second_joiner();
        let before = s.clone();
        assert!(s.local_move(0).is_none());
        assert_eq!(s, before);
    }

    #[test]
    fn local_move_on_occupied_cell_is_ignored() {
        let mut s = first_joiner();
        s.local_move(0).unwrap();
        s.remote_move(4, Some(2)).unwrap();
        let before = s.clone();
        assert!(s.local_move(4).is_none());
        assert!(s.local_move(0).is_none());
        assert_eq!(s, before);
    }

    #[test]
    fn local_move_out_of_range_is_ignored() {
        let mut s = first_joiner();
        assert!(s.local_move(9).is_none());
        assert_eq!(s.current_turn(), Some(Side::X));
    }

    #[test]
    fn local_move_while_waiting_is_ignored() {
        let mut s = Session::new("alice");
        s.joined("g1").unwrap();
        assert!(s.local_move(0).is_none());
        assert_eq!(s.board().filled(), 0);
    }

    #[test]
    fn double_submission_of_same_cell_applies_once() {
        let mut s = first_joiner();
        assert!(s.local_move(3).is_some());
        assert!(s.local_move(3).is_none());
        assert_eq!(s.board().filled(), 1);
    }

    #[test]
    fn turns_alternate_across_local_and_remote_moves() {
        let mut s = first_joiner();
        let mut last = s.current_turn();
        let script: [(bool, usize); 5] = [(true, 0), (false, 1), (true, 3), (false, 4), (true, 8)];
        for (seq, (local, cell)) in script.into_iter().enumerate() {
            if local {
                s.local_move(cell).unwrap();
            } else {
                s.remote_move(cell, Some(seq as u32 + 1)).unwrap();
            }
            assert_ne!(s.current_turn(), last, "turn repeated after move {seq}");
            last = s.current_turn();
        }
    }

    #[test]
    fn remote_move_marks_opponent_side() {
        let mut s = second_joiner();
        let mv = s.remote_move(0, Some(1)).unwrap();
        assert_eq!(mv.side, Side::X);
        assert_eq!(s.board().get(0), Some(Side::X));
        assert!(s.is_local_turn());
    }

    #[test]
    fn remote_move_out_of_sequence_is_rejected() {
        let mut s = second_joiner();
        let err = s.remote_move(0, Some(2)).unwrap_err();
        assert_eq!(err, SessionError::OutOfSequence { seq: 2, expected: 1 });
        assert_eq!(s.board().filled(), 0);
        assert_eq!(s.current_turn(), Some(Side::X));
    }

    #[test]
    fn remote_move_without_seq_is_accepted() {
        let mut s = second_joiner();
        s.remote_move(6, None).unwrap();
        assert_eq!(s.moves_applied(), 1);
    }

    #[test]
    fn remote_move_cannot_overwrite_a_cell() {
        let mut s = first_joiner();
        s.local_move(4).unwrap();
        let err = s.remote_move(4, None).unwrap_err();
        assert_eq!(err, SessionError::InvalidRemoteMove(BoardError::Occupied(4)));
        assert_eq!(s.board().get(4), Some(Side::X));
    }

    #[test]
    fn game_over_win_for_local_player_reads_you_won() {
        let mut s = first_joiner();
        s.game_over(GameOverResult::Win, Some("alice".into()), None)
            .unwrap();
        assert_eq!(s.phase(), Phase::Over);
        assert_eq!(s.result_text().as_deref(), Some("You won!"));
    }

    #[test]
    fn win_reads_you_won_even_when_display_name_differs_from_account() {
        let mut s = Session::new("player");
        s.joined("g1").unwrap();
        s.opponent_joined("bob").unwrap();
        s.game_over(GameOverResult::Win, Some("alice".into()), None)
            .unwrap();
        assert_eq!(s.result_text().as_deref(), Some("You won!"));

        let mut s = Session::new("player");
        s.joined("g1").unwrap();
        s.opponent_joined("bob").unwrap();
        s.game_over(GameOverResult::Win, Some("bob".into()), None)
            .unwrap();
        assert_eq!(s.result_text().as_deref(), Some("bob won!"));
    }

    #[test]
    fn game_over_win_for_opponent_names_them() {
        let mut s = second_joiner();
        s.game_over(GameOverResult::Win, Some("alice".into()), None)
            .unwrap();
        assert_eq!(s.result_text().as_deref(), Some("alice won!"));
    }

    #[test]
    fn game_over_draw() {
        let mut s = first_joiner();
        s.game_over(GameOverResult::Draw, None, None).unwrap();
        assert_eq!(s.result(), &GameResult::Draw);
        assert_eq!(s.result_text().as_deref(), Some("It's a draw!"));
    }

    #[test]
    fn game_over_win_without_winner_is_rejected() {
        let mut s = first_joiner();
        assert_eq!(
            s.game_over(GameOverResult::Win, None, None),
            Err(SessionError::MissingWinner)
        );
        assert_eq!(s.phase(), Phase::InProgress);
    }

    #[test]
    fn moves_are_refused_once_over() {
        let mut s = first_joiner();
        s.game_over(GameOverResult::Draw, None, None).unwrap();
        assert!(s.local_move(0).is_none());
        assert!(s.remote_move(0, None).is_err());
    }

    #[test]
    fn phase_never_moves_backwards() {
        let mut s = first_joiner();
        assert!(s.joined("g2").is_err());
        assert!(s.opponent_joined("carol").is_err());
        assert!(s.game_started("g2", "carol").is_err());
        assert_eq!(s.phase(), Phase::InProgress);

        s.game_over(GameOverResult::Draw, None, None).unwrap();
        assert!(s.opponent_joined("carol").is_err());
        assert!(s
            .game_over(GameOverResult::Win, Some("bob".into()), None)
            .is_err());
        assert_eq!(s.phase(), Phase::Over);
    }

    #[test]
    fn waiting_cannot_jump_to_over() {
        let mut s = Session::new("alice");
        s.joined("g1").unwrap();
        assert!(matches!(
            s.game_over(GameOverResult::Draw, None, None),
            Err(SessionError::IllegalTransition {
                phase: Phase::Waiting,
                ..
            })
        ));
    }

    #[test]
    fn new_game_only_from_over_and_resets_everything() {
        let mut s = first_joiner();
        assert!(s.new_game().is_err());

        s.local_move(0).unwrap();
        s.game_over(
            GameOverResult::Win,
            Some("bob".into()),
            Some("opponent_disconnected".into()),
        )
        .unwrap();
        assert_eq!(s.over_reason(), Some("opponent_disconnected"));

        s.new_game().unwrap();
        assert_eq!(s, Session::new("alice"));
    }
}
