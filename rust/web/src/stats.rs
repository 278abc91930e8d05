//! Aggregations over stored results, served by the statistics endpoints.

use crate::sink::ResultRecord;
use fourline_engine::player::DRAW;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum rows returned by any listing.
pub const ROW_LIMIT: usize = 50;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub wins: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyEntry {
    pub username: String,
    pub wins: u32,
    pub avg_moves: f64,
    pub min_moves: u32,
    pub max_moves: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total_players: usize,
    pub total_games: usize,
    pub total_draws: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentResult {
    pub game_id: String,
    pub player1: String,
    pub player2: String,
    pub winner: String,
    pub moves: u32,
    pub date: String,
}

fn decisive(results: &[ResultRecord]) -> impl Iterator<Item = &ResultRecord> {
    results.iter().filter(|r| r.winner != DRAW)
}

/// Wins per identity, most wins first, ties broken by name.
pub fn leaderboard(results: &[ResultRecord]) -> Vec<LeaderboardEntry> {
    let mut wins: BTreeMap<&str, u32> = BTreeMap::new();
    for result in decisive(results) {
        *wins.entry(result.winner.as_str()).or_default() += 1;
    }

    let mut rows: Vec<_> = wins
        .into_iter()
        .map(|(username, wins)| LeaderboardEntry {
            username: username.to_string(),
            wins,
        })
        .collect();
    // Stable sort keeps the BTreeMap's name order among equal counts.
    rows.sort_by(|a, b| b.wins.cmp(&a.wins));
    rows.truncate(ROW_LIMIT);
    rows
}

/// Move-count profile of each winner, fewest average moves first.
pub fn efficiency(results: &[ResultRecord]) -> Vec<EfficiencyEntry> {
    let mut moves: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for result in decisive(results) {
        moves
            .entry(result.winner.as_str())
            .or_default()
            .push(result.moves);
    }

    let mut rows: Vec<_> = moves
        .into_iter()
        .filter_map(|(username, counts)| {
            let min_moves = *counts.iter().min()?;
            let max_moves = *counts.iter().max()?;
            let total: u64 = counts.iter().map(|&m| u64::from(m)).sum();
            Some(EfficiencyEntry {
                username: username.to_string(),
                wins: u32::try_from(counts.len()).unwrap_or(u32::MAX),
                avg_moves: total as f64 / counts.len() as f64,
                min_moves,
                max_moves,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.avg_moves.total_cmp(&b.avg_moves));
    rows.truncate(ROW_LIMIT);
    rows
}

pub fn totals(results: &[ResultRecord]) -> Totals {
    let players: BTreeSet<&str> = results
        .iter()
        .flat_map(|r| [r.player1.as_str(), r.player2.as_str()])
        .collect();
    Totals {
        total_players: players.len(),
        total_games: results.len(),
        total_draws: results.iter().filter(|r| r.winner == DRAW).count(),
    }
}

/// Newest results first.
pub fn recent(results: &[ResultRecord]) -> Vec<RecentResult> {
    let mut ordered: Vec<&ResultRecord> = results.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    ordered
        .into_iter()
        .take(ROW_LIMIT)
        .map(|r| RecentResult {
            game_id: r.session_id.clone(),
            player1: r.player1.clone(),
            player2: r.player2.clone(),
            winner: r.winner.clone(),
            moves: r.moves,
            date: r.created_at.format(DATE_FORMAT).to_string(),
        })
        .collect()
}
