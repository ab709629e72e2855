//! Wallet manager - balances, XP/levels, streaks, ledger
//!
//! Every mutation is a single SQL transaction under the store's connection
//! lock: the balance update and its ledger row commit together or not at
//! all. Other coordinators compose wallet arithmetic into their own
//! transactions through the `apply_credit`/`apply_debit` helpers.

use std::sync::Arc;

use rusqlite::{params, Connection};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::db::ArenaDb;
use crate::domain::{
    xp_threshold, Achievements, LedgerEntry, Streak, TxCategory, TxKind, Wallet, STARTING_BONUS,
    XP_PER_COIN,
};
use crate::error::{ArenaError, Result};
use crate::notify::WalletHub;
use crate::time_bucket::{day_bucket, now_ms, today};

/// Owns per-user balance, XP, level, streak and achievement counters
pub struct WalletManager {
    db: ArenaDb,
    hub: Arc<WalletHub>,
}

impl WalletManager {
    pub(crate) fn new(db: ArenaDb, hub: Arc<WalletHub>) -> Self {
        Self { db, hub }
    }

    /// Create a wallet with the starting bonus. Idempotent: returns the
    /// existing wallet untouched when one is already present.
    pub fn initialize(&self, user_id: &str, user_name: &str) -> Result<Wallet> {
        let now = now_ms();
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;

        match load_wallet(&tx, user_id) {
            Ok(existing) => return Ok(existing),
            Err(ArenaError::WalletNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        tx.execute(
            r#"INSERT INTO wallets
               (user_id, user_name, coins, total_earned, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?3, ?4, ?4)"#,
            params![user_id, user_name, STARTING_BONUS, now],
        )?;
        append_ledger(
            &tx,
            user_id,
            TxKind::Earn,
            TxCategory::Bonus,
            STARTING_BONUS,
            0,
            STARTING_BONUS,
            "Welcome bonus",
            None,
            now,
        )?;
        let wallet = load_wallet(&tx, user_id)?;
        tx.commit()?;
        drop(conn);

        info!(user_id, "initialized wallet with starting bonus");
        self.hub.publish(&wallet);
        Ok(wallet)
    }

    /// Fetch a wallet
    pub fn get(&self, user_id: &str) -> Result<Wallet> {
        let conn = self.db.conn();
        load_wallet(&conn, user_id)
    }

    /// Add coins. Grants XP (amount * 10) and applies iterative leveling;
    /// appends an `earn` ledger row in the same transaction.
    pub fn credit(
        &self,
        user_id: &str,
        amount: i64,
        category: TxCategory,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<Wallet> {
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;
        let wallet = apply_credit(&tx, user_id, amount, category, description, reference_id)?;
        tx.commit()?;
        drop(conn);

        debug!(user_id, amount, category = category.as_str(), "credited wallet");
        self.hub.publish(&wallet);
        Ok(wallet)
    }

    /// Remove coins. Fails with `InsufficientFunds` before any mutation;
    /// appends a `spend` ledger row in the same transaction.
    pub fn debit(
        &self,
        user_id: &str,
        amount: i64,
        category: TxCategory,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<Wallet> {
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;
        let wallet = apply_debit(&tx, user_id, amount, category, description, reference_id)?;
        tx.commit()?;
        drop(conn);

        debug!(user_id, amount, category = category.as_str(), "debited wallet");
        self.hub.publish(&wallet);
        Ok(wallet)
    }

    /// Record qualifying activity for the daily streak. Date-only logic:
    /// activity yesterday extends the streak, a gap resets it to 1, and a
    /// second call on the same day leaves the count unchanged.
    pub fn update_streak(&self, user_id: &str) -> Result<Wallet> {
        let today = today();
        let today_s = today.format("%Y-%m-%d").to_string();
        let yesterday_s = today.pred_opt().map(|d| d.format("%Y-%m-%d").to_string());
        let now = now_ms();

        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;
        let wallet = load_wallet(&tx, user_id)?;

        let last = wallet.streak.last_active_day.as_deref();
        let current = if last == Some(today_s.as_str()) {
            wallet.streak.current
        } else if last.is_some() && last == yesterday_s.as_deref() {
            wallet.streak.current + 1
        } else {
            1
        };
        let longest = current.max(wallet.streak.longest);

        tx.execute(
            r#"UPDATE wallets SET streak_current = ?1, streak_longest = ?2,
               streak_last_active = ?3, updated_at = ?4 WHERE user_id = ?5"#,
            params![current, longest, today_s, now, user_id],
        )?;
        let wallet = load_wallet(&tx, user_id)?;
        tx.commit()?;
        drop(conn);

        debug!(user_id, current, "updated streak");
        self.hub.publish(&wallet);
        Ok(wallet)
    }

    /// Subscribe to committed wallet changes for a user
    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<Wallet> {
        self.hub.subscribe(user_id)
    }

    /// Ledger entries for a user, newest first
    pub fn history(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            r#"SELECT id, user_id, kind, category, amount, balance_before, balance_after,
                      description, reference_id, created_at
               FROM ledger WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2"#,
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok(LedgerEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                kind: TxKind::from_str(&row.get::<_, String>(2)?).unwrap_or(TxKind::Earn),
                category: TxCategory::from_str(&row.get::<_, String>(3)?)
                    .unwrap_or(TxCategory::Bonus),
                amount: row.get(4)?,
                balance_before: row.get(5)?,
                balance_after: row.get(6)?,
                description: row.get(7)?,
                reference_id: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

// ========================================
// CONNECTION-LEVEL HELPERS
// ========================================
// These run inside a caller-owned transaction so reward settlement, battle
// escrow and tournament fees stay atomic with their own record updates.

/// Load a wallet row, `WalletNotFound` when absent
pub(crate) fn load_wallet(conn: &Connection, user_id: &str) -> Result<Wallet> {
    let result = conn.query_row(
        r#"SELECT user_id, user_name, coins, total_earned, total_spent, level, experience,
                  streak_current, streak_longest, streak_last_active,
                  problems_solved, battles_won, tournaments_won, perfect_submissions,
                  badges, created_at, updated_at
           FROM wallets WHERE user_id = ?1"#,
        [user_id],
        |row| {
            Ok(Wallet {
                user_id: row.get(0)?,
                user_name: row.get(1)?,
                coins: row.get(2)?,
                total_earned: row.get(3)?,
                total_spent: row.get(4)?,
                level: row.get(5)?,
                experience: row.get(6)?,
                streak: Streak {
                    current: row.get(7)?,
                    longest: row.get(8)?,
                    last_active_day: row.get(9)?,
                },
                achievements: Achievements {
                    problems_solved: row.get(10)?,
                    battles_won: row.get(11)?,
                    tournaments_won: row.get(12)?,
                    perfect_submissions: row.get(13)?,
                },
                badges: serde_json::from_str(&row.get::<_, String>(14)?).unwrap_or_default(),
                created_at: row.get(15)?,
                updated_at: row.get(16)?,
            })
        },
    );
    match result {
        Ok(w) => Ok(w),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(ArenaError::WalletNotFound(user_id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Credit coins and XP, appending the matching ledger row
pub(crate) fn apply_credit(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    category: TxCategory,
    description: &str,
    reference_id: Option<&str>,
) -> Result<Wallet> {
    if amount <= 0 {
        return Err(ArenaError::InvalidAmount(amount));
    }
    let mut wallet = load_wallet(conn, user_id)?;
    let before = wallet.coins;
    let now = now_ms();

    wallet.coins += amount;
    wallet.total_earned += amount;
    wallet.experience += amount * XP_PER_COIN;
    // Iterative leveling: one big credit can cross several levels
    while wallet.experience >= xp_threshold(wallet.level) {
        wallet.experience -= xp_threshold(wallet.level);
        wallet.level += 1;
    }

    conn.execute(
        r#"UPDATE wallets SET coins = ?1, total_earned = ?2, level = ?3, experience = ?4,
           updated_at = ?5 WHERE user_id = ?6"#,
        params![
            wallet.coins,
            wallet.total_earned,
            wallet.level,
            wallet.experience,
            now,
            user_id
        ],
    )?;
    append_ledger(
        conn,
        user_id,
        TxKind::Earn,
        category,
        amount,
        before,
        wallet.coins,
        description,
        reference_id,
        now,
    )?;
    wallet.updated_at = now;
    Ok(wallet)
}

/// Debit coins, appending the matching ledger row
pub(crate) fn apply_debit(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    category: TxCategory,
    description: &str,
    reference_id: Option<&str>,
) -> Result<Wallet> {
    if amount <= 0 {
        return Err(ArenaError::InvalidAmount(amount));
    }
    let mut wallet = load_wallet(conn, user_id)?;
    if wallet.coins < amount {
        return Err(ArenaError::InsufficientFunds {
            required: amount,
            available: wallet.coins,
        });
    }
    let before = wallet.coins;
    let now = now_ms();

    wallet.coins -= amount;
    wallet.total_spent += amount;

    conn.execute(
        r#"UPDATE wallets SET coins = ?1, total_spent = ?2, updated_at = ?3 WHERE user_id = ?4"#,
        params![wallet.coins, wallet.total_spent, now, user_id],
    )?;
    append_ledger(
        conn,
        user_id,
        TxKind::Spend,
        category,
        amount,
        before,
        wallet.coins,
        description,
        reference_id,
        now,
    )?;
    wallet.updated_at = now;
    Ok(wallet)
}

/// Bump the problems-solved counter after a first solve
pub(crate) fn bump_problems_solved(conn: &Connection, user_id: &str, perfect: bool) -> Result<()> {
    conn.execute(
        r#"UPDATE wallets SET problems_solved = problems_solved + 1,
           perfect_submissions = perfect_submissions + ?1 WHERE user_id = ?2"#,
        params![perfect as i64, user_id],
    )?;
    Ok(())
}

/// Bump the battles-won counter after settlement
pub(crate) fn bump_battles_won(conn: &Connection, user_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE wallets SET battles_won = battles_won + 1 WHERE user_id = ?1",
        [user_id],
    )?;
    Ok(())
}

/// Bump the tournaments-won counter for a first-place finish
pub(crate) fn bump_tournaments_won(conn: &Connection, user_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE wallets SET tournaments_won = tournaments_won + 1 WHERE user_id = ?1",
        [user_id],
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn append_ledger(
    conn: &Connection,
    user_id: &str,
    kind: TxKind,
    category: TxCategory,
    amount: i64,
    balance_before: i64,
    balance_after: i64,
    description: &str,
    reference_id: Option<&str>,
    now: i64,
) -> Result<()> {
    conn.execute(
        r#"INSERT INTO ledger
           (user_id, kind, category, amount, balance_before, balance_after,
            description, reference_id, created_at, day_bucket)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
        params![
            user_id,
            kind.as_str(),
            category.as_str(),
            amount,
            balance_before,
            balance_after,
            description,
            reference_id,
            now,
            day_bucket(now),
        ],
    )?;
    Ok(())
}
