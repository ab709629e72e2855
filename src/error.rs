//! Error taxonomy for the arena engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArenaError>;

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("wallet not found for user '{0}'")]
    WalletNotFound(String),

    #[error("challenge not found: '{0}'")]
    ChallengeNotFound(String),

    #[error("battle not found: '{0}'")]
    BattleNotFound(String),

    #[error("tournament not found: '{0}'")]
    TournamentNotFound(String),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("battle is full")]
    BattleFull,

    #[error("tournament is full")]
    TournamentFull,

    #[error("user '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("user '{0}' is not a participant")]
    NotAParticipant(String),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
