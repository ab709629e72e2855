//! Progress tracking and first-solve rewards
//!
//! Every attempt is recorded; coins and points are granted exactly once per
//! (user, challenge) pair. The idempotency check is not a read followed by
//! a write: the solved set has a composite primary key, and the reward is
//! granted only when `INSERT OR IGNORE` reports a new row, inside the same
//! transaction as the credit.

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::ArenaDb;
use crate::domain::{
    Challenge, Difficulty, SolvedChallenge, Submission, SubmissionOutcome, SubmissionStatus,
    TxCategory, UserProgress, Wallet,
};
use crate::error::{ArenaError, Result};
use crate::notify::WalletHub;
use crate::time_bucket::{day_bucket, now_ms};
use crate::wallet::{apply_credit, bump_problems_solved, load_wallet};

/// Evaluates submissions and settles first-solve rewards
pub struct ProgressEvaluator {
    db: ArenaDb,
    hub: Arc<WalletHub>,
}

impl ProgressEvaluator {
    pub(crate) fn new(db: ArenaDb, hub: Arc<WalletHub>) -> Self {
        Self { db, hub }
    }

    /// Record a submission and, on the user's first accepted solve of the
    /// challenge, grant its coin and point rewards.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_solution(
        &self,
        user_id: &str,
        challenge_id: &str,
        code: &str,
        language: &str,
        status: SubmissionStatus,
        tests_passed: u32,
        tests_total: u32,
    ) -> Result<SubmissionOutcome> {
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;
        let (outcome, wallet) = record_submission(
            &tx,
            user_id,
            challenge_id,
            code,
            language,
            status,
            tests_passed,
            tests_total,
        )?;
        tx.commit()?;
        drop(conn);

        if let Some(wallet) = wallet {
            info!(
                user_id,
                challenge_id,
                coins = outcome.coins_earned,
                "first solve rewarded"
            );
            self.hub.publish(&wallet);
        } else {
            debug!(user_id, challenge_id, status = status.as_str(), "submission recorded");
        }
        Ok(outcome)
    }

    /// Solved set and cumulative points for a user. A user with no
    /// submissions yet has empty progress, not an error.
    pub fn progress(&self, user_id: &str) -> Result<UserProgress> {
        let conn = self.db.conn();

        let mut progress = conn
            .query_row(
                "SELECT total_points, hints_used FROM user_progress WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(UserProgress {
                        user_id: user_id.to_string(),
                        total_points: row.get(0)?,
                        solved: Vec::new(),
                        hints_used: serde_json::from_str(&row.get::<_, String>(1)?)
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()?
            .unwrap_or_else(|| UserProgress {
                user_id: user_id.to_string(),
                ..Default::default()
            });

        let mut stmt = conn.prepare(
            r#"SELECT challenge_id, submission_id, solved_at
               FROM solved_challenges WHERE user_id = ?1 ORDER BY solved_at"#,
        )?;
        progress.solved = stmt
            .query_map([user_id], |row| {
                Ok(SolvedChallenge {
                    challenge_id: row.get(0)?,
                    submission_id: row.get(1)?,
                    solved_at: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(progress)
    }

    /// Fetch one submission by id
    pub fn submission(&self, submission_id: &str) -> Result<Option<Submission>> {
        let conn = self.db.conn();
        let sub = conn
            .query_row(
                r#"SELECT id, user_id, challenge_id, status, language, tests_passed,
                          tests_total, points_earned, coins_earned, submitted_at
                   FROM submissions WHERE id = ?1"#,
                [submission_id],
                |row| {
                    Ok(Submission {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        challenge_id: row.get(2)?,
                        status: SubmissionStatus::from_str(&row.get::<_, String>(3)?)
                            .unwrap_or(SubmissionStatus::RuntimeError),
                        language: row.get(4)?,
                        tests_passed: row.get(5)?,
                        tests_total: row.get(6)?,
                        points_earned: row.get(7)?,
                        coins_earned: row.get(8)?,
                        submitted_at: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(sub)
    }

    /// Fetch a challenge
    pub fn challenge(&self, challenge_id: &str) -> Result<Challenge> {
        let conn = self.db.conn();
        load_challenge(&conn, challenge_id)
    }

    /// The daily challenge for the given day bucket, if one is scheduled.
    /// Evaluated at request time; there is no scheduler.
    pub fn daily_challenge(&self, day: &str) -> Result<Option<Challenge>> {
        let conn = self.db.conn();
        let challenge = conn
            .query_row(
                r#"SELECT id, title, difficulty, category, points, coin_reward, is_daily, daily_date
                   FROM challenges WHERE is_daily = 1 AND daily_date = ?1"#,
                [day],
                challenge_from_row,
            )
            .optional()?;
        Ok(challenge)
    }

    /// Write a challenge definition. Challenges are authored by the
    /// surrounding application; the engine only needs the write path.
    pub fn upsert_challenge(&self, challenge: &Challenge) -> Result<()> {
        let conn = self.db.conn();
        conn.execute(
            r#"INSERT OR REPLACE INTO challenges
               (id, title, difficulty, category, points, coin_reward, is_daily, daily_date)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                challenge.id,
                challenge.title,
                challenge.difficulty.as_str(),
                challenge.category,
                challenge.points,
                challenge.coin_reward,
                challenge.is_daily as i64,
                challenge.daily_date,
            ],
        )?;
        Ok(())
    }
}

// ========================================
// CONNECTION-LEVEL HELPERS
// ========================================

/// Record a submission inside a caller-owned transaction. Returns the
/// outcome and, when a reward was settled, the post-credit wallet for
/// publishing after commit. Used directly by the battle coordinator so a
/// battle submission stays a single atomic unit.
#[allow(clippy::too_many_arguments)]
pub(crate) fn record_submission(
    conn: &Connection,
    user_id: &str,
    challenge_id: &str,
    code: &str,
    language: &str,
    status: SubmissionStatus,
    tests_passed: u32,
    tests_total: u32,
) -> Result<(SubmissionOutcome, Option<Wallet>)> {
    let submission_id = Uuid::new_v4().to_string();
    let now = now_ms();

    // Audit every attempt, pass or fail
    conn.execute(
        r#"INSERT INTO submissions
           (id, user_id, challenge_id, status, language, code, tests_passed, tests_total,
            points_earned, coins_earned, submitted_at, day_bucket)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, ?9, ?10)"#,
        params![
            submission_id,
            user_id,
            challenge_id,
            status.as_str(),
            language,
            code,
            tests_passed,
            tests_total,
            now,
            day_bucket(now),
        ],
    )?;

    let mut outcome = SubmissionOutcome {
        submission_id: submission_id.clone(),
        status,
        points_earned: 0,
        coins_earned: 0,
        first_solve: false,
    };

    if !status.is_accepted() {
        return Ok((outcome, None));
    }

    let challenge = load_challenge(conn, challenge_id)?;
    ensure_progress_row(conn, user_id, now)?;

    // Atomic membership-and-insert: the composite primary key decides
    // whether this is the first solve.
    let inserted = conn.execute(
        r#"INSERT OR IGNORE INTO solved_challenges
           (user_id, challenge_id, submission_id, solved_at)
           VALUES (?1, ?2, ?3, ?4)"#,
        params![user_id, challenge_id, submission_id, now],
    )?;
    if inserted == 0 {
        // Already solved: the attempt is recorded with zero reward
        return Ok((outcome, None));
    }

    if challenge.coin_reward > 0 {
        apply_credit(
            conn,
            user_id,
            challenge.coin_reward,
            TxCategory::ChallengeReward,
            &format!("Solved '{}'", challenge.title),
            Some(&submission_id),
        )?;
    }
    conn.execute(
        "UPDATE submissions SET points_earned = ?1, coins_earned = ?2 WHERE id = ?3",
        params![challenge.points, challenge.coin_reward, submission_id],
    )?;
    conn.execute(
        "UPDATE user_progress SET total_points = total_points + ?1 WHERE user_id = ?2",
        params![challenge.points, user_id],
    )?;
    let perfect = tests_total > 0 && tests_passed == tests_total;
    bump_problems_solved(conn, user_id, perfect)?;

    outcome.points_earned = challenge.points;
    outcome.coins_earned = challenge.coin_reward;
    outcome.first_solve = true;

    let wallet = load_wallet(conn, user_id)?;
    Ok((outcome, Some(wallet)))
}

/// Load a challenge row, `ChallengeNotFound` when absent
pub(crate) fn load_challenge(conn: &Connection, challenge_id: &str) -> Result<Challenge> {
    let result = conn.query_row(
        r#"SELECT id, title, difficulty, category, points, coin_reward, is_daily, daily_date
           FROM challenges WHERE id = ?1"#,
        [challenge_id],
        challenge_from_row,
    );
    match result {
        Ok(c) => Ok(c),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(ArenaError::ChallengeNotFound(challenge_id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn challenge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        id: row.get(0)?,
        title: row.get(1)?,
        difficulty: Difficulty::from_str(&row.get::<_, String>(2)?).unwrap_or(Difficulty::Easy),
        category: row.get(3)?,
        points: row.get(4)?,
        coin_reward: row.get(5)?,
        is_daily: row.get::<_, i64>(6)? != 0,
        daily_date: row.get(7)?,
    })
}

fn ensure_progress_row(conn: &Connection, user_id: &str, now: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_progress (user_id, created_at) VALUES (?1, ?2)",
        params![user_id, now],
    )?;
    Ok(())
}
