//! 1v1 battle types

use serde::{Deserialize, Serialize};

/// Participants per battle
pub const BATTLE_SIZE: u32 = 2;

/// Battle lifecycle. Transitions are monotonic; `Completed` and `Forfeited`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Waiting,
    InProgress,
    Completed,
    Forfeited,
}

impl BattleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Forfeited => "forfeited",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "forfeited" => Some(Self::Forfeited),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Forfeited)
    }
}

/// Participant standing within a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Joined,
    Submitted,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Submitted => "submitted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "joined" => Some(Self::Joined),
            "submitted" => Some(Self::Submitted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleParticipant {
    pub user_id: String,
    /// 0-100, percentage of test cases passed; None until submission
    pub score: Option<u32>,
    pub status: ParticipantStatus,
    pub submission_id: Option<String>,
    pub submitted_at: Option<i64>,
    pub joined_at: i64,
}

/// A timed 1v1 match with escrowed entry fees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battle {
    pub id: String,
    pub challenge_id: String,
    pub entry_fee: i64,
    /// Fixed at creation: entry_fee * BATTLE_SIZE minus the 10% platform fee
    pub prize_pool: i64,
    pub max_participants: u32,
    pub duration_secs: u32,
    pub status: BattleStatus,
    pub winner_id: Option<String>,
    pub participants: Vec<BattleParticipant>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Battle {
    /// Prize pool after the 10% platform fee, floored to whole coins
    pub fn prize_pool_for(entry_fee: i64, max_participants: u32) -> i64 {
        entry_fee * max_participants as i64 * 9 / 10
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() as u32 >= self.max_participants
    }

    pub fn participant(&self, user_id: &str) -> Option<&BattleParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prize_pool_floors_platform_fee() {
        assert_eq!(Battle::prize_pool_for(100, 2), 180);
        assert_eq!(Battle::prize_pool_for(25, 2), 45);
        // 15 * 2 * 0.9 = 27
        assert_eq!(Battle::prize_pool_for(15, 2), 27);
        // Remainder is floored, never rounded up
        assert_eq!(Battle::prize_pool_for(3, 2), 5);
        assert_eq!(Battle::prize_pool_for(0, 2), 0);
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            BattleStatus::Waiting,
            BattleStatus::InProgress,
            BattleStatus::Completed,
            BattleStatus::Forfeited,
        ] {
            assert_eq!(BattleStatus::from_str(s.as_str()), Some(s));
        }
        assert!(BattleStatus::Completed.is_terminal());
        assert!(BattleStatus::Forfeited.is_terminal());
        assert!(!BattleStatus::Waiting.is_terminal());
    }
}
