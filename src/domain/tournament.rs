//! Tournament types

use serde::{Deserialize, Serialize};

/// Tournament lifecycle. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Upcoming,
    Registration,
    InProgress,
    Completed,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Registration => "registration",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(Self::Upcoming),
            "registration" => Some(Self::Registration),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Registration is open before play starts
    pub fn accepts_registration(&self) -> bool {
        matches!(self, Self::Upcoming | Self::Registration)
    }

    /// Position in the lifecycle, used to reject status regressions
    pub fn order(&self) -> u8 {
        match self {
            Self::Upcoming => 0,
            Self::Registration => 1,
            Self::InProgress => 2,
            Self::Completed => 3,
        }
    }
}

/// Fixed prize amounts paid out at completion
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PrizeSplit {
    pub first: i64,
    pub second: i64,
    pub third: i64,
}

impl PrizeSplit {
    /// Prizes in payout order
    pub fn places(&self) -> [i64; 3] {
        [self.first, self.second, self.third]
    }
}

/// Creation parameters for a tournament
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentConfig {
    pub name: String,
    pub entry_fee: i64,
    pub max_participants: u32,
    pub prizes: PrizeSplit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentParticipant {
    pub user_id: String,
    pub total_score: i64,
    pub solved_challenges: u32,
    pub registered_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: String,
    pub name: String,
    pub entry_fee: i64,
    pub max_participants: u32,
    pub status: TournamentStatus,
    pub prizes: PrizeSplit,
    pub participants: Vec<TournamentParticipant>,
    pub created_at: i64,
}

impl Tournament {
    pub fn is_full(&self) -> bool {
        self.participants.len() as u32 >= self.max_participants
    }

    pub fn participant(&self, user_id: &str) -> Option<&TournamentParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }
}
