//! Challenge, submission and progress types

use serde::{Deserialize, Serialize};

/// Challenge difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

/// A coding challenge. Authored outside the core; the engine only reads
/// `points` and `coin_reward` when settling first-solve rewards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub category: String,
    pub points: i64,
    pub coin_reward: i64,
    pub is_daily: bool,
    /// Day bucket the challenge is the daily for, when `is_daily`
    pub daily_date: Option<String>,
}

/// Verdict of a submission as judged by the execution service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Accepted,
    WrongAnswer,
    RuntimeError,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::WrongAnswer => "wrong_answer",
            Self::RuntimeError => "runtime_error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(Self::Accepted),
            "wrong_answer" => Some(Self::WrongAnswer),
            "runtime_error" => Some(Self::RuntimeError),
            _ => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// One attempt at a challenge. `points_earned`/`coins_earned` are nonzero
/// only on the user's first accepted submission for that challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub user_id: String,
    pub challenge_id: String,
    pub status: SubmissionStatus,
    pub language: String,
    pub tests_passed: u32,
    pub tests_total: u32,
    pub points_earned: i64,
    pub coins_earned: i64,
    pub submitted_at: i64,
}

/// Membership in the solved set defines reward idempotency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvedChallenge {
    pub challenge_id: String,
    pub submission_id: String,
    pub solved_at: i64,
}

/// Per-user progress, created lazily on first submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    pub total_points: i64,
    pub solved: Vec<SolvedChallenge>,
    pub hints_used: Vec<String>,
}

impl UserProgress {
    pub fn has_solved(&self, challenge_id: &str) -> bool {
        self.solved.iter().any(|s| s.challenge_id == challenge_id)
    }
}

/// What a submission yielded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub submission_id: String,
    pub status: SubmissionStatus,
    pub points_earned: i64,
    pub coins_earned: i64,
    pub first_solve: bool,
}
