//! Wallet, streak, achievement and ledger types

use serde::{Deserialize, Serialize};

/// Coins granted when a wallet is first created
pub const STARTING_BONUS: i64 = 100;

/// Experience gained per coin credited
pub const XP_PER_COIN: i64 = 10;

/// XP required to move past the given level
pub fn xp_threshold(level: i64) -> i64 {
    level * 100
}

/// One wallet per user. The `coins` field is the source of truth for the
/// current balance; the ledger is the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: String,
    pub user_name: String,
    pub coins: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub level: i64,
    /// Always below `xp_threshold(level)`; credits that overflow carry the
    /// remainder into the next level.
    pub experience: i64,
    pub streak: Streak,
    pub achievements: Achievements,
    pub badges: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Consecutive-day activity streak
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
    /// Day bucket ("YYYY-MM-DD") of the last qualifying activity
    pub last_active_day: Option<String>,
}

/// Achievement counters bumped by the reward, battle and tournament paths
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Achievements {
    pub problems_solved: u32,
    pub battles_won: u32,
    pub tournaments_won: u32,
    pub perfect_submissions: u32,
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Earn,
    Spend,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earn => "earn",
            Self::Spend => "spend",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "earn" => Some(Self::Earn),
            "spend" => Some(Self::Spend),
            _ => None,
        }
    }
}

/// What a ledger entry was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxCategory {
    /// Starting balance grant
    Bonus,
    /// First-solve challenge reward
    ChallengeReward,
    BattleEntry,
    BattlePrize,
    TournamentEntry,
    TournamentPrize,
}

impl TxCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bonus => "bonus",
            Self::ChallengeReward => "challenge_reward",
            Self::BattleEntry => "battle_entry",
            Self::BattlePrize => "battle_prize",
            Self::TournamentEntry => "tournament_entry",
            Self::TournamentPrize => "tournament_prize",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bonus" => Some(Self::Bonus),
            "challenge_reward" => Some(Self::ChallengeReward),
            "battle_entry" => Some(Self::BattleEntry),
            "battle_prize" => Some(Self::BattlePrize),
            "tournament_entry" => Some(Self::TournamentEntry),
            "tournament_prize" => Some(Self::TournamentPrize),
            _ => None,
        }
    }
}

/// Immutable ledger record. `balance_after = balance_before +/- amount`
/// holds for every row at the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub kind: TxKind,
    pub category: TxCategory,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub description: String,
    pub reference_id: Option<String>,
    pub created_at: i64,
}
