//! 1v1 battle lifecycle - escrow, submissions, prize settlement
//!
//! Entry fees are debited at join time and held in the battle's prize pool
//! until settlement. The winner takes the whole pool (90% of the fees); the
//! 10% platform fee leaves circulation and is credited nowhere.

use std::sync::Arc;

use rusqlite::{params, Connection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::ArenaDb;
use crate::domain::{
    Battle, BattleParticipant, BattleStatus, ParticipantStatus, SubmissionOutcome,
    SubmissionStatus, TxCategory, BATTLE_SIZE,
};
use crate::error::{ArenaError, Result};
use crate::notify::WalletHub;
use crate::progress::{load_challenge, record_submission};
use crate::time_bucket::{day_bucket, now_ms};
use crate::wallet::{apply_credit, apply_debit, bump_battles_won, load_wallet};

/// Manages battle creation, joining, submissions and settlement
pub struct BattleCoordinator {
    db: ArenaDb,
    hub: Arc<WalletHub>,
}

impl BattleCoordinator {
    pub(crate) fn new(db: ArenaDb, hub: Arc<WalletHub>) -> Self {
        Self { db, hub }
    }

    /// Create a battle with the creator as sole participant. The entry fee
    /// is debited first; if the creator cannot afford it, no battle exists.
    pub fn create(
        &self,
        creator_id: &str,
        challenge_id: &str,
        entry_fee: i64,
        duration_secs: u32,
    ) -> Result<Battle> {
        if entry_fee < 0 {
            return Err(ArenaError::InvalidAmount(entry_fee));
        }
        let id = Uuid::new_v4().to_string();
        let now = now_ms();

        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;

        load_challenge(&tx, challenge_id)?;
        let wallet = if entry_fee > 0 {
            Some(apply_debit(
                &tx,
                creator_id,
                entry_fee,
                TxCategory::BattleEntry,
                "Battle entry fee",
                Some(&id),
            )?)
        } else {
            // Free battles still require an existing wallet
            load_wallet(&tx, creator_id)?;
            None
        };

        let prize_pool = Battle::prize_pool_for(entry_fee, BATTLE_SIZE);
        tx.execute(
            r#"INSERT INTO battles
               (id, challenge_id, entry_fee, prize_pool, max_participants, duration_secs,
                status, created_at, day_bucket)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                id,
                challenge_id,
                entry_fee,
                prize_pool,
                BATTLE_SIZE,
                duration_secs,
                BattleStatus::Waiting.as_str(),
                now,
                day_bucket(now),
            ],
        )?;
        insert_participant(&tx, &id, creator_id, now)?;

        let battle = load_battle(&tx, &id)?;
        tx.commit()?;
        drop(conn);

        info!(battle_id = %battle.id, creator_id, entry_fee, "created battle");
        if let Some(wallet) = wallet {
            self.hub.publish(&wallet);
        }
        Ok(battle)
    }

    /// Join a waiting battle, paying the entry fee. Filling the last slot
    /// moves the battle to `in_progress`.
    pub fn join(&self, battle_id: &str, user_id: &str) -> Result<Battle> {
        let now = now_ms();
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;

        let battle = load_battle(&tx, battle_id)?;
        if battle.participant(user_id).is_some() {
            return Err(ArenaError::DuplicateRegistration(user_id.to_string()));
        }
        if battle.is_full() {
            return Err(ArenaError::BattleFull);
        }
        if battle.status != BattleStatus::Waiting {
            return Err(ArenaError::InvalidTransition {
                from: battle.status.as_str().to_string(),
                to: "joined".to_string(),
            });
        }

        let wallet = if battle.entry_fee > 0 {
            Some(apply_debit(
                &tx,
                user_id,
                battle.entry_fee,
                TxCategory::BattleEntry,
                "Battle entry fee",
                Some(battle_id),
            )?)
        } else {
            load_wallet(&tx, user_id)?;
            None
        };
        insert_participant(&tx, battle_id, user_id, now)?;

        if battle.participants.len() as u32 + 1 == battle.max_participants {
            tx.execute(
                "UPDATE battles SET status = ?1, started_at = ?2 WHERE id = ?3",
                params![BattleStatus::InProgress.as_str(), now, battle_id],
            )?;
        }

        let battle = load_battle(&tx, battle_id)?;
        tx.commit()?;
        drop(conn);

        info!(battle_id, user_id, status = battle.status.as_str(), "joined battle");
        if let Some(wallet) = wallet {
            self.hub.publish(&wallet);
        }
        Ok(battle)
    }

    /// Submit a solution for the battle's challenge. Routes through the
    /// reward evaluator (first-solve rewards apply as usual) and records
    /// the score against the participant, all in one transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_solution(
        &self,
        battle_id: &str,
        user_id: &str,
        code: &str,
        language: &str,
        status: SubmissionStatus,
        tests_passed: u32,
        tests_total: u32,
    ) -> Result<SubmissionOutcome> {
        let now = now_ms();
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;

        let battle = load_battle(&tx, battle_id)?;
        if battle.status != BattleStatus::InProgress {
            return Err(ArenaError::InvalidTransition {
                from: battle.status.as_str().to_string(),
                to: "submitted".to_string(),
            });
        }
        if battle.participant(user_id).is_none() {
            return Err(ArenaError::NotAParticipant(user_id.to_string()));
        }

        let (outcome, wallet) = record_submission(
            &tx,
            user_id,
            &battle.challenge_id,
            code,
            language,
            status,
            tests_passed,
            tests_total,
        )?;

        let score = battle_score(tests_passed, tests_total);
        tx.execute(
            r#"UPDATE battle_participants
               SET score = ?1, status = ?2, submission_id = ?3, submitted_at = ?4
               WHERE battle_id = ?5 AND user_id = ?6"#,
            params![
                score,
                ParticipantStatus::Submitted.as_str(),
                outcome.submission_id,
                now,
                battle_id,
                user_id
            ],
        )?;
        tx.commit()?;
        drop(conn);

        debug!(battle_id, user_id, score, "battle solution submitted");
        if let Some(wallet) = wallet {
            self.hub.publish(&wallet);
        }
        Ok(outcome)
    }

    /// Settle an in-progress battle: highest score wins, ties go to the
    /// earlier submission, a participant who never submitted ranks last.
    /// The winner is credited the full prize pool exactly once.
    pub fn complete(&self, battle_id: &str) -> Result<Battle> {
        let now = now_ms();
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;

        let battle = load_battle(&tx, battle_id)?;
        if battle.status != BattleStatus::InProgress {
            return Err(ArenaError::InvalidTransition {
                from: battle.status.as_str().to_string(),
                to: BattleStatus::Completed.as_str().to_string(),
            });
        }

        let winner_id = pick_winner(&battle.participants)
            .ok_or_else(|| ArenaError::BattleNotFound(battle_id.to_string()))?;
        let wallet = self.settle(&tx, &battle, &winner_id, BattleStatus::Completed, now)?;

        let battle = load_battle(&tx, battle_id)?;
        tx.commit()?;
        drop(conn);

        info!(battle_id, winner_id = %winner_id, prize = battle.prize_pool, "battle completed");
        self.hub.publish(&wallet);
        Ok(battle)
    }

    /// Forfeit an in-progress battle: the opponent wins and receives the
    /// prize pool. Terminal, counts as a win for the opponent.
    pub fn forfeit(&self, battle_id: &str, user_id: &str) -> Result<Battle> {
        let now = now_ms();
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;

        let battle = load_battle(&tx, battle_id)?;
        if battle.status != BattleStatus::InProgress {
            return Err(ArenaError::InvalidTransition {
                from: battle.status.as_str().to_string(),
                to: BattleStatus::Forfeited.as_str().to_string(),
            });
        }
        if battle.participant(user_id).is_none() {
            return Err(ArenaError::NotAParticipant(user_id.to_string()));
        }
        let winner_id = battle
            .participants
            .iter()
            .find(|p| p.user_id != user_id)
            .map(|p| p.user_id.clone())
            .ok_or_else(|| ArenaError::NotAParticipant(user_id.to_string()))?;

        let wallet = self.settle(&tx, &battle, &winner_id, BattleStatus::Forfeited, now)?;

        let battle = load_battle(&tx, battle_id)?;
        tx.commit()?;
        drop(conn);

        info!(battle_id, forfeited_by = user_id, winner_id = %winner_id, "battle forfeited");
        self.hub.publish(&wallet);
        Ok(battle)
    }

    /// Fetch a battle with its participants
    pub fn get(&self, battle_id: &str) -> Result<Battle> {
        let conn = self.db.conn();
        load_battle(&conn, battle_id)
    }

    /// Joinable battles (waiting, below capacity), oldest first
    pub fn open_battles(&self) -> Result<Vec<Battle>> {
        let ids: Vec<String> = {
            let conn = self.db.conn();
            let mut stmt = conn.prepare(
                "SELECT id FROM battles WHERE status = 'waiting' ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.filter_map(|r| r.ok()).collect()
        };

        let conn = self.db.conn();
        let mut battles = Vec::with_capacity(ids.len());
        for id in ids {
            let battle = load_battle(&conn, &id)?;
            if !battle.is_full() {
                battles.push(battle);
            }
        }
        Ok(battles)
    }

    /// Credit the prize, bump the win counter and close the battle
    fn settle(
        &self,
        conn: &Connection,
        battle: &Battle,
        winner_id: &str,
        status: BattleStatus,
        now: i64,
    ) -> Result<crate::domain::Wallet> {
        if battle.prize_pool > 0 {
            apply_credit(
                conn,
                winner_id,
                battle.prize_pool,
                TxCategory::BattlePrize,
                "Battle prize",
                Some(&battle.id),
            )?;
        }
        bump_battles_won(conn, winner_id)?;
        conn.execute(
            "UPDATE battles SET status = ?1, winner_id = ?2, completed_at = ?3 WHERE id = ?4",
            params![status.as_str(), winner_id, now, battle.id],
        )?;
        load_wallet(conn, winner_id)
    }
}

/// Percentage of test cases passed, rounded to the nearest whole point
fn battle_score(tests_passed: u32, tests_total: u32) -> u32 {
    if tests_total == 0 {
        return 0;
    }
    (tests_passed * 100 + tests_total / 2) / tests_total
}

/// Deterministic winner selection: score descending, then earliest
/// submission, then earliest join (covers the nobody-submitted case).
fn pick_winner(participants: &[BattleParticipant]) -> Option<String> {
    let mut ranked: Vec<&BattleParticipant> = participants.iter().collect();
    ranked.sort_by_key(|p| {
        (
            -(p.score.map(|s| s as i64).unwrap_or(-1)),
            p.submitted_at.unwrap_or(i64::MAX),
            p.joined_at,
        )
    });
    ranked.first().map(|p| p.user_id.clone())
}

/// Load a battle row with its participants, `BattleNotFound` when absent
pub(crate) fn load_battle(conn: &Connection, battle_id: &str) -> Result<Battle> {
    let result = conn.query_row(
        r#"SELECT id, challenge_id, entry_fee, prize_pool, max_participants, duration_secs,
                  status, winner_id, created_at, started_at, completed_at
           FROM battles WHERE id = ?1"#,
        [battle_id],
        |row| {
            Ok(Battle {
                id: row.get(0)?,
                challenge_id: row.get(1)?,
                entry_fee: row.get(2)?,
                prize_pool: row.get(3)?,
                max_participants: row.get(4)?,
                duration_secs: row.get(5)?,
                status: BattleStatus::from_str(&row.get::<_, String>(6)?)
                    .unwrap_or(BattleStatus::Waiting),
                winner_id: row.get(7)?,
                participants: Vec::new(),
                created_at: row.get(8)?,
                started_at: row.get(9)?,
                completed_at: row.get(10)?,
            })
        },
    );
    let mut battle = match result {
        Ok(b) => b,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(ArenaError::BattleNotFound(battle_id.to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut stmt = conn.prepare(
        r#"SELECT user_id, score, status, submission_id, submitted_at, joined_at
           FROM battle_participants WHERE battle_id = ?1 ORDER BY joined_at"#,
    )?;
    battle.participants = stmt
        .query_map([battle_id], |row| {
            Ok(BattleParticipant {
                user_id: row.get(0)?,
                score: row.get(1)?,
                status: ParticipantStatus::from_str(&row.get::<_, String>(2)?)
                    .unwrap_or(ParticipantStatus::Joined),
                submission_id: row.get(3)?,
                submitted_at: row.get(4)?,
                joined_at: row.get(5)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(battle)
}

fn insert_participant(conn: &Connection, battle_id: &str, user_id: &str, now: i64) -> Result<()> {
    conn.execute(
        r#"INSERT INTO battle_participants (battle_id, user_id, status, joined_at)
           VALUES (?1, ?2, ?3, ?4)"#,
        params![battle_id, user_id, ParticipantStatus::Joined.as_str(), now],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Challenge, Difficulty, STARTING_BONUS};
    use crate::progress::ProgressEvaluator;
    use crate::wallet::WalletManager;
    use tempfile::{tempdir, TempDir};

    struct Setup {
        _dir: TempDir,
        wallets: WalletManager,
        battles: BattleCoordinator,
    }

    fn setup() -> Setup {
        let dir = tempdir().unwrap();
        let db = ArenaDb::open(&dir.path().join("arena.db")).unwrap();
        let hub = Arc::new(WalletHub::new());
        let wallets = WalletManager::new(db.clone(), hub.clone());
        let progress = ProgressEvaluator::new(db.clone(), hub.clone());
        progress
            .upsert_challenge(&Challenge {
                id: "duel".to_string(),
                title: "Duel Problem".to_string(),
                difficulty: Difficulty::Medium,
                category: "arrays".to_string(),
                points: 10,
                coin_reward: 50,
                is_daily: false,
                daily_date: None,
            })
            .unwrap();
        wallets.initialize("alice", "Alice").unwrap();
        wallets.initialize("bob", "Bob").unwrap();
        Setup {
            _dir: dir,
            wallets,
            battles: BattleCoordinator::new(db, hub),
        }
    }

    fn set_submission_times(s: &Setup, battle_id: &str, times: &[(&str, i64)]) {
        let conn = s.battles.db.conn();
        for (user, ts) in times {
            conn.execute(
                "UPDATE battle_participants SET submitted_at = ?1 WHERE battle_id = ?2 AND user_id = ?3",
                params![ts, battle_id, user],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_create_escrows_fee_and_fixes_prize() {
        let s = setup();
        let battle = s.battles.create("alice", "duel", 100, 900).unwrap();

        assert_eq!(battle.status, BattleStatus::Waiting);
        assert_eq!(battle.prize_pool, 180);
        assert_eq!(battle.participants.len(), 1);
        assert_eq!(s.wallets.get("alice").unwrap().coins, 0);
    }

    #[test]
    fn test_create_fails_without_funds_and_leaves_no_battle() {
        let s = setup();
        let err = s.battles.create("alice", "duel", 150, 900).unwrap_err();
        assert!(matches!(err, ArenaError::InsufficientFunds { .. }));

        assert_eq!(s.wallets.get("alice").unwrap().coins, STARTING_BONUS);
        assert!(s.battles.open_battles().unwrap().is_empty());
    }

    #[test]
    fn test_join_fills_and_starts_battle() {
        let s = setup();
        let battle = s.battles.create("alice", "duel", 100, 900).unwrap();

        let battle = s.battles.join(&battle.id, "bob").unwrap();
        assert_eq!(battle.status, BattleStatus::InProgress);
        assert_eq!(battle.participants.len(), 2);
        assert_eq!(s.wallets.get("bob").unwrap().coins, 0);

        // Escrow total equals fee * participants
        assert_eq!(
            s.wallets.get("alice").unwrap().total_spent + s.wallets.get("bob").unwrap().total_spent,
            battle.entry_fee * battle.max_participants as i64
        );
    }

    #[test]
    fn test_join_rejections() {
        let s = setup();
        s.wallets.initialize("carol", "Carol").unwrap();
        let battle = s.battles.create("alice", "duel", 100, 900).unwrap();

        // Creator cannot join twice
        let err = s.battles.join(&battle.id, "alice").unwrap_err();
        assert!(matches!(err, ArenaError::DuplicateRegistration(_)));

        s.battles.join(&battle.id, "bob").unwrap();

        // Third player bounces off a full battle, wallet untouched
        let err = s.battles.join(&battle.id, "carol").unwrap_err();
        assert!(matches!(err, ArenaError::BattleFull));
        assert_eq!(s.wallets.get("carol").unwrap().coins, STARTING_BONUS);

        let err = s.battles.join("no-such-battle", "carol").unwrap_err();
        assert!(matches!(err, ArenaError::BattleNotFound(_)));
    }

    #[test]
    fn test_full_battle_settlement() {
        let s = setup();
        let battle = s.battles.create("alice", "duel", 100, 900).unwrap();
        s.battles.join(&battle.id, "bob").unwrap();

        // Alice solves everything (first solve: +50 reward), Bob half
        s.battles
            .submit_solution(&battle.id, "alice", "code", "rust", SubmissionStatus::Accepted, 10, 10)
            .unwrap();
        s.battles
            .submit_solution(&battle.id, "bob", "code", "rust", SubmissionStatus::WrongAnswer, 5, 10)
            .unwrap();

        let done = s.battles.complete(&battle.id).unwrap();
        assert_eq!(done.status, BattleStatus::Completed);
        assert_eq!(done.winner_id.as_deref(), Some("alice"));

        let alice = s.wallets.get("alice").unwrap();
        let bob = s.wallets.get("bob").unwrap();
        // 100 - 100 (fee) + 50 (first solve) + 180 (prize)
        assert_eq!(alice.coins, 230);
        assert_eq!(alice.achievements.battles_won, 1);
        // 100 - 100 (fee), nothing back
        assert_eq!(bob.coins, 0);
        assert_eq!(bob.achievements.battles_won, 0);

        // Second completion must not pay twice
        let err = s.battles.complete(&battle.id).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidTransition { .. }));
        assert_eq!(s.wallets.get("alice").unwrap().coins, 230);
    }

    #[test]
    fn test_equal_scores_earlier_submission_wins() {
        let s = setup();
        let battle = s.battles.create("alice", "duel", 10, 900).unwrap();
        s.battles.join(&battle.id, "bob").unwrap();

        s.battles
            .submit_solution(&battle.id, "bob", "code", "rust", SubmissionStatus::Accepted, 10, 10)
            .unwrap();
        s.battles
            .submit_solution(&battle.id, "alice", "code", "rust", SubmissionStatus::Accepted, 10, 10)
            .unwrap();
        // Force distinct timestamps; bob was first
        set_submission_times(&s, &battle.id, &[("bob", 1000), ("alice", 2000)]);

        let done = s.battles.complete(&battle.id).unwrap();
        assert_eq!(done.winner_id.as_deref(), Some("bob"));
    }

    #[test]
    fn test_non_submitter_ranks_last() {
        let s = setup();
        let battle = s.battles.create("alice", "duel", 10, 900).unwrap();
        s.battles.join(&battle.id, "bob").unwrap();

        // Only bob submits, scoring zero - still beats a no-show
        s.battles
            .submit_solution(&battle.id, "bob", "code", "rust", SubmissionStatus::WrongAnswer, 0, 10)
            .unwrap();

        let done = s.battles.complete(&battle.id).unwrap();
        assert_eq!(done.winner_id.as_deref(), Some("bob"));
    }

    #[test]
    fn test_forfeit_awards_opponent_once() {
        let s = setup();
        let battle = s.battles.create("alice", "duel", 100, 900).unwrap();
        s.battles.join(&battle.id, "bob").unwrap();

        let done = s.battles.forfeit(&battle.id, "alice").unwrap();
        assert_eq!(done.status, BattleStatus::Forfeited);
        assert_eq!(done.winner_id.as_deref(), Some("bob"));

        let bob = s.wallets.get("bob").unwrap();
        assert_eq!(bob.coins, 180);
        assert_eq!(bob.achievements.battles_won, 1);

        // Terminal: no second settlement of any kind
        assert!(matches!(
            s.battles.forfeit(&battle.id, "bob").unwrap_err(),
            ArenaError::InvalidTransition { .. }
        ));
        assert!(matches!(
            s.battles.complete(&battle.id).unwrap_err(),
            ArenaError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_submission_guards() {
        let s = setup();
        s.wallets.initialize("carol", "Carol").unwrap();
        let battle = s.battles.create("alice", "duel", 10, 900).unwrap();

        // Cannot submit while waiting
        let err = s
            .battles
            .submit_solution(&battle.id, "alice", "c", "rust", SubmissionStatus::Accepted, 1, 1)
            .unwrap_err();
        assert!(matches!(err, ArenaError::InvalidTransition { .. }));

        s.battles.join(&battle.id, "bob").unwrap();

        // Outsiders cannot submit
        let err = s
            .battles
            .submit_solution(&battle.id, "carol", "c", "rust", SubmissionStatus::Accepted, 1, 1)
            .unwrap_err();
        assert!(matches!(err, ArenaError::NotAParticipant(_)));
    }

    #[test]
    fn test_open_battles_lists_waiting_only() {
        let s = setup();
        let open = s.battles.create("alice", "duel", 10, 900).unwrap();
        let filled = s.battles.create("bob", "duel", 10, 900).unwrap();
        s.wallets.initialize("carol", "Carol").unwrap();
        s.battles.join(&filled.id, "carol").unwrap();

        let listed = s.battles.open_battles().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, open.id);
    }

    #[test]
    fn test_battle_score_rounding() {
        assert_eq!(battle_score(10, 10), 100);
        assert_eq!(battle_score(5, 10), 50);
        assert_eq!(battle_score(1, 3), 33);
        assert_eq!(battle_score(2, 3), 67);
        assert_eq!(battle_score(0, 0), 0);
    }
}
