//! Coin wallet and competition engine for a coding practice platform
//!
//! Users earn coins and XP by solving challenges, wager entry fees in 1v1
//! battles, and compete in tournaments with fixed prize splits. Everything
//! is backed by a single SQLite file: balances, an append-only ledger,
//! solve history, battle and tournament state. Leaderboards are computed
//! from those tables at query time and never stored.
//!
//! The [`Arena`] handle owns the database and the wallet notification hub;
//! the per-area managers it hands out all share them.
//!
//! ```no_run
//! use codearena::{Arena, SubmissionStatus};
//!
//! # fn main() -> codearena::Result<()> {
//! let arena = Arena::open(std::path::Path::new("arena.db"))?;
//! arena.wallets().initialize("alice", "Alice")?;
//! arena.progress().submit_solution(
//!     "alice", "two-sum", "fn main() {}", "rust",
//!     SubmissionStatus::Accepted, 10, 10,
//! )?;
//! println!("{}", arena.wallets().get("alice")?.coins);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

pub mod battle;
pub mod db;
pub mod domain;
pub mod error;
pub mod leaderboard;
pub mod notify;
pub mod progress;
pub mod time_bucket;
pub mod tournament;
pub mod wallet;

pub use domain::*;
pub use error::{ArenaError, Result};

use battle::BattleCoordinator;
use db::ArenaDb;
use leaderboard::LeaderboardQuery;
use notify::WalletHub;
use progress::ProgressEvaluator;
use tournament::TournamentCoordinator;
use wallet::WalletManager;

/// Entry point: opens the store and hands out the per-area managers
pub struct Arena {
    db: ArenaDb,
    hub: Arc<WalletHub>,
}

impl Arena {
    /// Open (or create) the arena database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: ArenaDb::open(path)?,
            hub: Arc::new(WalletHub::new()),
        })
    }

    /// Wallet balances, ledger, streaks and subscriptions
    pub fn wallets(&self) -> WalletManager {
        WalletManager::new(self.db.clone(), self.hub.clone())
    }

    /// Challenge submissions and first-solve rewards
    pub fn progress(&self) -> ProgressEvaluator {
        ProgressEvaluator::new(self.db.clone(), self.hub.clone())
    }

    /// 1v1 battles with escrowed entry fees
    pub fn battles(&self) -> BattleCoordinator {
        BattleCoordinator::new(self.db.clone(), self.hub.clone())
    }

    /// Tournaments with fixed prize splits
    pub fn tournaments(&self) -> TournamentCoordinator {
        TournamentCoordinator::new(self.db.clone(), self.hub.clone())
    }

    /// Stateless ranked views
    pub fn leaderboard(&self) -> LeaderboardQuery {
        LeaderboardQuery::new(self.db.clone())
    }
}
