//! # fourline-ai: Automated Opponents for Four-in-a-Row
//!
//! Provides the policies that play on behalf of the synthetic opponent when
//! no second human joins a match.
//!
//! ## Core Components
//!
//! - [`Opponent`] - Trait defining the interface for column selection
//! - [`heuristic`] - Win / block / center-preference heuristic
//! - [`create_opponent`] - Factory function for creating opponents by kind
//!
//! ## Quick Start
//!
//! ```rust
//! use fourline_ai::{create_opponent, Opponent};
//! use fourline_engine::game::Match;
//! use fourline_engine::player::BOT_IDENTITY;
//!
//! let bot = create_opponent("heuristic").expect("known kind");
//!
//! let mut game = Match::new("demo", "carol", BOT_IDENTITY);
//! game.apply_move(0, "carol").unwrap();
//!
//! let column = bot.choose_column(&game).expect("board has room");
//! game.apply_move(column, BOT_IDENTITY).unwrap();
//! ```

use fourline_engine::game::Match;

pub mod heuristic;

/// Interface for automated players.
///
/// Implementations must be pure with respect to the match: they inspect the
/// board and return a column, never mutating the live game.
pub trait Opponent: Send + Sync {
    /// Pick a column for the side whose turn it currently is.
    ///
    /// Returns `None` only when every column is full.
    fn choose_column(&self, game: &Match) -> Option<usize>;

    /// Return the name/identifier of this implementation.
    fn name(&self) -> &str;
}

/// Factory function to create opponents by kind string.
///
/// # Supported Kinds
///
/// - `"heuristic"` (or `""`) - [`heuristic::HeuristicOpponent`]
///
/// # Example
///
/// ```rust
/// use fourline_ai::create_opponent;
///
/// let bot = create_opponent("heuristic").unwrap();
/// assert_eq!(bot.name(), "HeuristicOpponent");
/// assert!(create_opponent("minimax").is_none());
/// ```
pub fn create_opponent(kind: &str) -> Option<Box<dyn Opponent>> {
    match kind {
        "heuristic" | "" => Some(Box::new(heuristic::HeuristicOpponent::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opponent_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn Opponent>();
    }

    #[test]
    fn empty_kind_defaults_to_heuristic() {
        let bot = create_opponent("").expect("default kind");
        assert_eq!(bot.name(), "HeuristicOpponent");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(create_opponent("random").is_none());
    }
}
