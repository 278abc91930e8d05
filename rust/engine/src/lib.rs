//! # fourline-engine: Four-in-a-Row Game Engine Core
//!
//! A pure, synchronous state machine for a single two-player match on a
//! 6x7 gravity-fill board. Provides move validation, turn tracking, win and
//! draw detection, and forfeits. No I/O and no clocks other than the
//! timestamps recorded on each match.
//!
//! ## Core Modules
//!
//! - [`board`] - Grid of cells, gravity drop, line detection
//! - [`game`] - The [`Match`](game::Match) state machine and its outcome types
//! - [`player`] - Sides and reserved identities
//! - [`errors`] - Gameplay rejections
//!
//! ## Quick Start
//!
//! ```rust
//! use fourline_engine::game::{Match, Winner};
//!
//! let mut game = Match::new("demo", "alice", "bob");
//! for _ in 0..3 {
//!     game.apply_move(0, "alice").unwrap();
//!     game.apply_move(1, "bob").unwrap();
//! }
//! game.apply_move(0, "alice").unwrap();
//!
//! assert!(game.is_finished());
//! assert_eq!(game.winner(), Some(&Winner::Player("alice".into())));
//! ```
//!
//! ## Scratch Simulation
//!
//! [`Board`](board::Board) is `Copy`, so "what if" checks run on a copy and
//! never touch the live match:
//!
//! ```rust
//! use fourline_engine::board::{Board, Cell};
//!
//! let live = Board::new();
//! let mut scratch = live;
//! let row = scratch.drop_piece(3, Cell::One).unwrap();
//! assert!(!scratch.check_win(row, 3, Cell::One));
//! assert_eq!(live.get(row, 3), Cell::Empty);
//! ```

pub mod board;
pub mod errors;
pub mod game;
pub mod player;

pub use board::{Board, Cell, COLS, CONNECT, ROWS};
pub use errors::GameError;
pub use game::{EndReason, Match, Outcome, Placement, Winner};
pub use player::{is_reserved_identity, Side, BOT_IDENTITY, DRAW};
