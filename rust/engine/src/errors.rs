use thiserror::Error;

/// Rejections produced by [`Match`](crate::game::Match) move validation.
///
/// The `Display` strings are sent verbatim to clients in `error` frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("game finished")]
    GameAlreadyFinished,
    #[error("invalid column")]
    InvalidColumn { column: i64 },
    #[error("not your turn")]
    NotYourTurn { expected: String, actual: String },
    #[error("column full")]
    ColumnFull { column: usize },
}
