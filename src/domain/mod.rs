//! Core domain types for the arena engine

mod battle;
mod challenge;
mod leaderboard;
mod tournament;
mod wallet;

pub use battle::{Battle, BattleParticipant, BattleStatus, ParticipantStatus, BATTLE_SIZE};
pub use challenge::{
    Challenge, Difficulty, SolvedChallenge, Submission, SubmissionOutcome, SubmissionStatus,
    UserProgress,
};
pub use leaderboard::{LeaderboardEntry, BATTLE_WIN_BONUS};
pub use tournament::{
    PrizeSplit, Tournament, TournamentConfig, TournamentParticipant, TournamentStatus,
};
pub use wallet::{
    xp_threshold, Achievements, LedgerEntry, Streak, TxCategory, TxKind, Wallet, STARTING_BONUS,
    XP_PER_COIN,
};
