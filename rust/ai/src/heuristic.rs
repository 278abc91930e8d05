//! Rule-based opponent used when no second human is available.
//!
//! The policy is deterministic and works on scratch copies of the board:
//!
//! 1. Take an immediate win if one exists (leftmost winning column).
//! 2. Otherwise block the opponent's immediate win (leftmost such column).
//! 3. Otherwise play the first open column in center-out order.

use crate::Opponent;
use fourline_engine::board::{Board, COLS};
use fourline_engine::game::Match;
use fourline_engine::player::Side;

#[derive(Debug, Clone, Default)]
pub struct HeuristicOpponent;

impl HeuristicOpponent {
    pub fn new() -> Self {
        Self
    }
}

impl Opponent for HeuristicOpponent {
    fn choose_column(&self, game: &Match) -> Option<usize> {
        choose_column_for(game.board(), game.current_side())
    }

    fn name(&self) -> &str {
        "HeuristicOpponent"
    }
}

/// Select a column for `side` on `board`.
pub fn choose_column_for(board: &Board, side: Side) -> Option<usize> {
    winning_column(board, side)
        .or_else(|| winning_column(board, side.other()))
        .or_else(|| {
            preference_order()
                .into_iter()
                .find(|&col| !board.is_column_full(col))
        })
}

/// Leftmost column in which a piece for `side` would complete a line.
pub fn winning_column(board: &Board, side: Side) -> Option<usize> {
    (0..COLS).find(|&col| {
        let mut scratch = *board;
        match scratch.drop_piece(col, side.cell()) {
            Ok(row) => scratch.check_win(row, col, side.cell()),
            Err(_) => false,
        }
    })
}

/// Columns ordered center first, then alternating outward, left before right.
pub fn preference_order() -> [usize; COLS] {
    let center = COLS / 2;
    let mut order = [center; COLS];
    let mut next = 1;
    for offset in 1..=center {
        for col in [center.checked_sub(offset), Some(center + offset)] {
            if let Some(col) = col.filter(|&c| c < COLS) {
                if next < COLS {
                    order[next] = col;
                    next += 1;
                }
            }
        }
    }
    order
}
