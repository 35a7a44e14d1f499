// Board representation and win evaluation for the 3x3 grid.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// A player's marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    X,
    O,
}

impl Side {
    /// The other marker.
    pub fn opponent(self) -> Side {
        match self {
            Side::X => Side::O,
            Side::O => Side::X,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::X => "X",
            Side::O => "O",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("cell index {0} is outside the board")]
    OutOfRange(usize),

    #[error("cell {0} is already occupied")]
    Occupied(usize),

    #[error("expected 9 cells, got {0}")]
    WrongLength(usize),

    #[error("invalid cell value {0:?}")]
    InvalidCell(String),
}

/// The 3x3 grid, indexed row-major from 0 (top-left) to 8 (bottom-right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Board {
    cells: [Option<Side>; CELL_COUNT],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from explicit cell contents.
    pub fn from_cells(cells: [Option<Side>; CELL_COUNT]) -> Self {
        Board { cells }
    }

    pub fn cells(&self) -> &[Option<Side>; CELL_COUNT] {
        &self.cells
    }

    /// Contents of `index`, or `None` for an empty or out-of-range cell.
    pub fn get(&self, index: usize) -> Option<Side> {
        self.cells.get(index).copied().flatten()
    }

    pub fn is_empty_cell(&self, index: usize) -> bool {
        index < CELL_COUNT && self.cells[index].is_none()
    }

    /// Mark `index` with `side`. An occupied cell is never overwritten.
    pub fn place(&mut self, index: usize, side: Side) -> Result<(), BoardError> {
        let cell = self
            .cells
            .get_mut(index)
            .ok_or(BoardError::OutOfRange(index))?;
        if cell.is_some() {
            return Err(BoardError::Occupied(index));
        }
        *cell = Some(side);
        Ok(())
    }

    /// Number of occupied cells.
    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.filled() == CELL_COUNT
    }

    /// Encode as the persisted string-cell form: `"X"`, `"O"` or `""` per cell.
    pub fn to_strings(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|c| c.map(|s| s.as_str().to_string()).unwrap_or_default())
            .collect()
    }

    /// Decode the persisted string-cell form produced by [`Board::to_strings`].
    pub fn from_strings<S: AsRef<str>>(values: &[S]) -> Result<Self, BoardError> {
        if values.len() != CELL_COUNT {
            return Err(BoardError::WrongLength(values.len()));
        }
        let mut cells = [None; CELL_COUNT];
        for (cell, value) in cells.iter_mut().zip(values) {
            *cell = match value.as_ref() {
                "" => None,
                "X" => Some(Side::X),
                "O" => Some(Side::O),
                other => return Err(BoardError::InvalidCell(other.to_string())),
            };
        }
        Ok(Board { cells })
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// One of the eight winning triples. Only used to draw the strike-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WinLine {
    Row(u8),
    Column(u8),
    Diagonal,
    AntiDiagonal,
}

impl WinLine {
    /// Cell indices covered by the line.
    pub fn cells(self) -> [usize; 3] {
        match self {
            WinLine::Row(r) => {
                let start = r as usize * 3;
                [start, start + 1, start + 2]
            }
            WinLine::Column(c) => {
                let c = c as usize;
                [c, c + 3, c + 6]
            }
            WinLine::Diagonal => [0, 4, 8],
            WinLine::AntiDiagonal => [2, 4, 6],
        }
    }
}

/// Rows, then columns, then the two diagonals.
pub const WIN_LINES: [WinLine; 8] = [
    WinLine::Row(0),
    WinLine::Row(1),
    WinLine::Row(2),
    WinLine::Column(0),
    WinLine::Column(1),
    WinLine::Column(2),
    WinLine::Diagonal,
    WinLine::AntiDiagonal,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// No triple yet and at least one empty cell.
    Undecided,
    Winner(Side),
    Draw,
}

/// Result of evaluating a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub outcome: Outcome,
    /// The matched triple when `outcome` is `Winner`.
    pub line: Option<WinLine>,
}

impl Evaluation {
    pub fn is_terminal(&self) -> bool {
        self.outcome != Outcome::Undecided
    }
}

/// Computes the winner or draw of a board.
///
/// Stateless; constructed explicitly and owned by whoever needs it, so two
/// sessions never share evaluation state.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoardEvaluator;

impl BoardEvaluator {
    pub fn new() -> Self {
        BoardEvaluator
    }

    /// Check the eight triples for three equal marks, then fall back to
    /// draw (full board) or undecided.
    pub fn evaluate(&self, board: &Board) -> Evaluation {
        for line in WIN_LINES {
            let [a, b, c] = line.cells();
            if let Some(side) = board.get(a) {
                if board.get(b) == Some(side) && board.get(c) == Some(side) {
                    return Evaluation {
                        outcome: Outcome::Winner(side),
                        line: Some(line),
                    };
                }
            }
        }

        let outcome = if board.is_full() {
            Outcome::Draw
        } else {
            Outcome::Undecided
        };
        Evaluation {
            outcome,
            line: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: parse a 9-char layout like "X...X...X" ('.' = empty).
    fn board(layout: &str) -> Board {
        let mut cells = [None; CELL_COUNT];
        for (i, ch) in layout.chars().enumerate() {
            cells[i] = match ch {
                'X' => Some(Side::X),
                'O' => Some(Side::O),
                _ => None,
            };
        }
        Board::from_cells(cells)
    }

    #[test]
    fn empty_board_is_undecided() {
        let eval = BoardEvaluator::new().evaluate(&Board::new());
        assert_eq!(eval.outcome, Outcome::Undecided);
        assert!(eval.line.is_none());
        assert!(!eval.is_terminal());
    }

    #[test]
    fn main_diagonal_wins_for_x() {
        let eval = BoardEvaluator::new().evaluate(&board("X...X...X"));
        assert_eq!(eval.outcome, Outcome::Winner(Side::X));
        assert_eq!(eval.line, Some(WinLine::Diagonal));
    }

    #[test]
    fn full_board_without_triple_is_draw() {
        let eval = BoardEvaluator::new().evaluate(&board("XOXOXOOXO"));
        assert_eq!(eval.outcome, Outcome::Draw);
        assert!(eval.line.is_none());
        assert!(eval.is_terminal());
    }

    #[test]
    fn column_zero_wins() {
        let eval = BoardEvaluator::new().evaluate(&board("XOXXOOX.."));
        assert_eq!(eval.outcome, Outcome::Winner(Side::X));
        assert_eq!(eval.line, Some(WinLine::Column(0)));
    }

    #[test]
    fn anti_diagonal_wins_for_o() {
        let eval = BoardEvaluator::new().evaluate(&board("XXO.O.O.X"));
        assert_eq!(eval.outcome, Outcome::Winner(Side::O));
        assert_eq!(eval.line, Some(WinLine::AntiDiagonal));
    }

    #[test]
    fn win_on_last_cell_beats_draw() {
        // Full board where the final X completes row 2.
        let eval = BoardEvaluator::new().evaluate(&board("OXOXOOXXX"));
        assert_eq!(eval.outcome, Outcome::Winner(Side::X));
        assert_eq!(eval.line, Some(WinLine::Row(2)));
    }

    #[test]
    fn every_line_is_detected() {
        let evaluator = BoardEvaluator::new();
        for line in WIN_LINES {
            let mut b = Board::new();
            for cell in line.cells() {
                b.place(cell, Side::O).unwrap();
            }
            let eval = evaluator.evaluate(&b);
            assert_eq!(eval.outcome, Outcome::Winner(Side::O), "line {line:?}");
            assert_eq!(eval.line, Some(line));
        }
    }

    #[test]
    fn draw_iff_full_and_no_triple() {
        // Walk every board over {empty, X, O}^9 and check the draw rule.
        let evaluator = BoardEvaluator::new();
        for code in 0..3u32.pow(9) {
            let mut cells = [None; CELL_COUNT];
            let mut n = code;
            for cell in cells.iter_mut() {
                *cell = match n % 3 {
                    1 => Some(Side::X),
                    2 => Some(Side::O),
                    _ => None,
                };
                n /= 3;
            }
            let b = Board::from_cells(cells);
            let has_triple = WIN_LINES.iter().any(|line| {
                let [a, m, c] = line.cells();
                b.get(a).is_some() && b.get(a) == b.get(m) && b.get(a) == b.get(c)
            });
            let eval = evaluator.evaluate(&b);
            assert_eq!(
                eval.outcome == Outcome::Draw,
                b.is_full() && !has_triple,
                "board {:?}",
                b.to_strings()
            );
        }
    }

    #[test]
    fn evaluation_is_idempotent() {
        let evaluator = BoardEvaluator::new();
        let b = board("XO.XO.X..");
        assert_eq!(evaluator.evaluate(&b), evaluator.evaluate(&b));
    }

    #[test]
    fn place_rejects_occupied_and_out_of_range() {
        let mut b = Board::new();
        b.place(4, Side::X).unwrap();
        assert_eq!(b.place(4, Side::O), Err(BoardError::Occupied(4)));
        assert_eq!(b.get(4), Some(Side::X));
        assert_eq!(b.place(9, Side::O), Err(BoardError::OutOfRange(9)));
        assert_eq!(b.filled(), 1);
    }

    #[test]
    fn string_cells_decode_and_reject_garbage() {
        let b = Board::from_strings(&["X", "", "O", "", "", "", "", "", ""]).unwrap();
        assert_eq!(b.get(0), Some(Side::X));
        assert_eq!(b.get(2), Some(Side::O));
        assert_eq!(b.to_strings()[1], "");

        assert_eq!(
            Board::from_strings(&["X"; 8]),
            Err(BoardError::WrongLength(8))
        );
        assert_eq!(
            Board::from_strings(&["Z", "", "", "", "", "", "", "", ""]),
            Err(BoardError::InvalidCell("Z".into()))
        );
    }

    #[test]
    fn side_opponent_flips() {
        assert_eq!(Side::X.opponent(), Side::O);
        assert_eq!(Side::O.opponent(), Side::X);
        assert_eq!(Side::X.to_string(), "X");
    }
}
