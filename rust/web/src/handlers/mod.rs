pub mod health;
pub mod stats;
pub mod ws;

pub use health::health;
pub use stats::{efficiency, leaderboard, recent_results, totals};
pub use ws::serve_connection;
