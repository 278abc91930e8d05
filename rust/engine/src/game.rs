use crate::board::{Board, COLS};
use crate::errors::GameError;
use crate::player::{Side, DRAW};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final result of a match: a participant identity or a draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Player(String),
    Draw,
}

impl Winner {
    /// Wire form: the winning identity, or the draw sentinel.
    pub fn as_str(&self) -> &str {
        match self {
            Winner::Player(identity) => identity,
            Winner::Draw => DRAW,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a match reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Four (or more) in a line.
    Connect,
    BoardFull,
    /// A participant's connection closed mid-game.
    Forfeit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub winner: Winner,
    pub reason: EndReason,
}

/// Result of a successful move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub side: Side,
    pub row: usize,
    pub column: usize,
}

/// In-memory state of a single match between two sides.
///
/// A match is mutated only through validated moves (or a forfeit) and becomes
/// terminal on a win, a full board, or a forfeit. Once terminal every further
/// move fails with [`GameError::GameAlreadyFinished`] and the board is frozen.
///
/// # Examples
///
/// ```
/// use fourline_engine::game::Match;
///
/// let mut game = Match::new("g-1", "alice", "bob");
/// let placement = game.apply_move(3, "alice").expect("alice moves first");
/// assert_eq!(placement.row, 5);
/// assert_eq!(game.current_player(), "bob");
/// assert_eq!(game.moves(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Match {
    id: String,
    board: Board,
    turn: Side,
    players: [String; 2],
    moves: u32,
    started_at: DateTime<Utc>,
    last_move_at: DateTime<Utc>,
    outcome: Option<Outcome>,
}

impl Match {
    pub fn new(
        id: impl Into<String>,
        player_one: impl Into<String>,
        player_two: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            board: Board::new(),
            turn: Side::One,
            players: [player_one.into(), player_two.into()],
            moves: 0,
            started_at: now,
            last_move_at: now,
            outcome: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn player(&self, side: Side) -> &str {
        &self.players[side.index()]
    }

    pub fn current_side(&self) -> Side {
        self.turn
    }

    pub fn current_player(&self) -> &str {
        self.player(self.turn)
    }

    pub fn moves(&self) -> u32 {
        self.moves
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_move_at(&self) -> DateTime<Utc> {
        self.last_move_at
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn winner(&self) -> Option<&Winner> {
        self.outcome.as_ref().map(|outcome| &outcome.winner)
    }

    /// Apply a move on behalf of `actor`, which must be the identity whose
    /// turn it is.
    pub fn apply_move(&mut self, column: usize, actor: &str) -> Result<Placement, GameError> {
        self.validate(column)?;
        if actor != self.current_player() {
            return Err(GameError::NotYourTurn {
                expected: self.current_player().to_string(),
                actual: actor.to_string(),
            });
        }
        self.place(column)
    }

    /// Apply a move for a seat rather than an identity. Two participants
    /// sharing a display name still cannot move for one another.
    pub fn apply_move_for(&mut self, side: Side, column: usize) -> Result<Placement, GameError> {
        self.validate(column)?;
        if side != self.turn {
            return Err(GameError::NotYourTurn {
                expected: self.current_player().to_string(),
                actual: self.player(side).to_string(),
            });
        }
        self.place(column)
    }

    /// End the match because `leaver` abandoned it; the other side wins.
    pub fn forfeit(&mut self, leaver: Side) -> Result<&Winner, GameError> {
        if self.is_finished() {
            return Err(GameError::GameAlreadyFinished);
        }
        let winner = Winner::Player(self.player(leaver.other()).to_string());
        let outcome = self.outcome.insert(Outcome {
            winner,
            reason: EndReason::Forfeit,
        });
        Ok(&outcome.winner)
    }

    fn validate(&self, column: usize) -> Result<(), GameError> {
        if self.is_finished() {
            return Err(GameError::GameAlreadyFinished);
        }
        if column >= COLS {
            return Err(GameError::InvalidColumn {
                column: i64::try_from(column).unwrap_or(i64::MAX),
            });
        }
        Ok(())
    }

    fn place(&mut self, column: usize) -> Result<Placement, GameError> {
        let side = self.turn;
        let mark = side.cell();
        let row = self.board.drop_piece(column, mark)?;

        self.moves += 1;
        self.last_move_at = Utc::now();

        if self.board.check_win(row, column, mark) {
            self.outcome = Some(Outcome {
                winner: Winner::Player(self.player(side).to_string()),
                reason: EndReason::Connect,
            });
        } else if self.board.is_full() {
            self.outcome = Some(Outcome {
                winner: Winner::Draw,
                reason: EndReason::BoardFull,
            });
        } else {
            self.turn = side.other();
        }

        Ok(Placement { side, row, column })
    }
}
