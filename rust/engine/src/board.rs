use crate::errors::GameError;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

pub const ROWS: usize = 6;
pub const COLS: usize = 7;

/// Pieces in a line needed to win.
pub const CONNECT: usize = 4;

/// Direction vectors (row step, column step) for the four win axes:
/// horizontal, vertical, and both diagonals.
const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Content of a single board position.
///
/// Serialized as `0` (empty), `1` (side one) and `2` (side two) so that board
/// snapshots travel as plain integer grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    #[default]
    Empty,
    One,
    Two,
}

impl Cell {
    pub fn code(self) -> u8 {
        match self {
            Cell::Empty => 0,
            Cell::One => 1,
            Cell::Two => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Cell> {
        match code {
            0 => Some(Cell::Empty),
            1 => Some(Cell::One),
            2 => Some(Cell::Two),
            _ => None,
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Cell::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("invalid cell value {code}")))
    }
}

/// A 6x7 grid with gravity-fill semantics.
///
/// Row 0 is the top row, row 5 the bottom. A placed piece always occupies the
/// lowest empty row of its column, so no column ever has a gap below a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Cell; COLS]; ROWS],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cell at a specific position.
    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.cells[row][col]
    }

    pub fn cells(&self) -> &[[Cell; COLS]; ROWS] {
        &self.cells
    }

    pub fn is_column_full(&self, col: usize) -> bool {
        col >= COLS || self.cells[0][col] != Cell::Empty
    }

    /// Row a piece dropped into `col` would land on, searching bottom-up.
    pub fn lowest_empty_row(&self, col: usize) -> Option<usize> {
        if col >= COLS {
            return None;
        }
        (0..ROWS).rev().find(|&row| self.cells[row][col] == Cell::Empty)
    }

    /// Drop a piece into `col` and return the row where it landed.
    pub fn drop_piece(&mut self, col: usize, cell: Cell) -> Result<usize, GameError> {
        if col >= COLS {
            return Err(GameError::InvalidColumn { column: col as i64 });
        }
        let row = self
            .lowest_empty_row(col)
            .ok_or(GameError::ColumnFull { column: col })?;
        self.cells[row][col] = cell;
        Ok(row)
    }

    /// True iff the top row is occupied everywhere.
    pub fn is_full(&self) -> bool {
        self.cells[0].iter().all(|&cell| cell != Cell::Empty)
    }

    /// Whether the piece at (`row`, `col`) completes a line of `CONNECT` or more
    /// cells equal to `cell`, along any axis running through that position.
    /// The position itself must hold `cell`.
    pub fn check_win(&self, row: usize, col: usize, cell: Cell) -> bool {
        if cell == Cell::Empty || row >= ROWS || col >= COLS || self.cells[row][col] != cell {
            return false;
        }

        AXES.iter().any(|&(dr, dc)| {
            let count = 1
                + self.run_length(row, col, dr, dc, cell)
                + self.run_length(row, col, -dr, -dc, cell);
            count >= CONNECT
        })
    }

    /// Contiguous `cell` matches starting one step away from (`row`, `col`).
    fn run_length(&self, row: usize, col: usize, dr: isize, dc: isize, cell: Cell) -> usize {
        let mut count = 0;
        let mut r = row as isize + dr;
        let mut c = col as isize + dc;
        while (0..ROWS as isize).contains(&r)
            && (0..COLS as isize).contains(&c)
            && self.cells[r as usize][c as usize] == cell
        {
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, row: usize, col: usize, cell: Cell) {
        self.cells[row][col] = cell;
    }
}
