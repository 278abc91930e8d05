use crate::board::Cell;
use serde::{Deserialize, Serialize};

/// Identity under which the automated opponent plays.
pub const BOT_IDENTITY: &str = "BOT";

/// Winner sentinel reported when a match ends with a full board.
pub const DRAW: &str = "draw";

/// One of the two participants of a match.
/// `One` always moves first.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    One,
    Two,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }

    /// The mark this side leaves on the board.
    pub fn cell(self) -> Cell {
        match self {
            Side::One => Cell::One,
            Side::Two => Cell::Two,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::One => 0,
            Side::Two => 1,
        }
    }
}

/// Identities a human may not claim: the bot's name and the draw sentinel.
pub fn is_reserved_identity(identity: &str) -> bool {
    identity == BOT_IDENTITY || identity.eq_ignore_ascii_case(DRAW)
}
