//! Derived leaderboard types
//!
//! Leaderboard entries are computed per query from wallets, submissions and
//! battles. They are never persisted; there is no stored rank to go stale.

use serde::{Deserialize, Serialize};

/// Synthetic score added per battle won in the weekly/monthly views
pub const BATTLE_WIN_BONUS: i64 = 50;

/// One row of a ranked view. `rank` is the 1-based position after sorting
/// by (rating desc, problems_solved desc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub user_name: String,
    pub rating: i64,
    pub problems_solved: u32,
    pub battles_won: u32,
    pub level: i64,
    pub rank: u32,
}
