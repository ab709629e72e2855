//! Stateless leaderboard queries
//!
//! Every view is recomputed from the underlying tables at query time. The
//! all-time view ranks wallets by balance; the weekly and monthly views
//! rank activity inside the window, with a flat bonus per battle won.

use std::collections::HashMap;

use tracing::debug;

use crate::db::ArenaDb;
use crate::domain::{LeaderboardEntry, BATTLE_WIN_BONUS};
use crate::error::Result;
use crate::time_bucket::{month_start_bucket, today, week_start_bucket};

/// Read-only ranked views over wallets, submissions and battles
pub struct LeaderboardQuery {
    db: ArenaDb,
}

impl LeaderboardQuery {
    pub(crate) fn new(db: ArenaDb) -> Self {
        Self { db }
    }

    /// All-time standings: rating is the current coin balance
    pub fn all_time(&self) -> Result<Vec<LeaderboardEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            r#"SELECT user_id, user_name, coins, level, problems_solved, battles_won
               FROM wallets"#,
        )?;
        let mut entries: Vec<LeaderboardEntry> = stmt
            .query_map([], |row| {
                Ok(LeaderboardEntry {
                    user_id: row.get(0)?,
                    user_name: row.get(1)?,
                    rating: row.get(2)?,
                    level: row.get(3)?,
                    problems_solved: row.get(4)?,
                    battles_won: row.get(5)?,
                    rank: 0,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(conn);

        rank(&mut entries);
        debug!(entries = entries.len(), "computed all-time leaderboard");
        Ok(entries)
    }

    /// Standings for the current ISO week (Monday start, UTC)
    pub fn weekly(&self) -> Result<Vec<LeaderboardEntry>> {
        self.windowed(&week_start_bucket(today()))
    }

    /// Standings for the current calendar month (UTC)
    pub fn monthly(&self) -> Result<Vec<LeaderboardEntry>> {
        self.windowed(&month_start_bucket(today()))
    }

    /// Rank activity on or after the given day bucket. Rating is coins
    /// earned from accepted submissions plus a flat bonus per battle won;
    /// only users with activity in the window appear.
    fn windowed(&self, start_bucket: &str) -> Result<Vec<LeaderboardEntry>> {
        let conn = self.db.conn();

        struct Activity {
            coins: i64,
            problems_solved: u32,
            battles_won: u32,
        }
        let mut activity: HashMap<String, Activity> = HashMap::new();

        let mut stmt = conn.prepare(
            r#"SELECT user_id, SUM(coins_earned),
                      SUM(CASE WHEN coins_earned > 0 THEN 1 ELSE 0 END)
               FROM submissions
               WHERE status = 'accepted' AND day_bucket >= ?1
               GROUP BY user_id"#,
        )?;
        let rows = stmt.query_map([start_bucket], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, u32>(2)?,
            ))
        })?;
        for row in rows {
            let (user_id, coins, solved) = row?;
            activity.insert(
                user_id,
                Activity {
                    coins,
                    problems_solved: solved,
                    battles_won: 0,
                },
            );
        }
        drop(stmt);

        let mut stmt = conn.prepare(
            r#"SELECT winner_id, COUNT(*)
               FROM battles
               WHERE winner_id IS NOT NULL
                 AND status IN ('completed', 'forfeited')
                 AND day_bucket >= ?1
               GROUP BY winner_id"#,
        )?;
        let rows = stmt.query_map([start_bucket], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        for row in rows {
            let (user_id, wins) = row?;
            activity
                .entry(user_id)
                .or_insert(Activity {
                    coins: 0,
                    problems_solved: 0,
                    battles_won: 0,
                })
                .battles_won = wins;
        }
        drop(stmt);

        let mut entries = Vec::with_capacity(activity.len());
        for (user_id, act) in activity {
            let (user_name, level) = conn
                .query_row(
                    "SELECT user_name, level FROM wallets WHERE user_id = ?1",
                    [&user_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .unwrap_or((user_id.clone(), 1));
            entries.push(LeaderboardEntry {
                user_id,
                user_name,
                rating: act.coins + act.battles_won as i64 * BATTLE_WIN_BONUS,
                problems_solved: act.problems_solved,
                battles_won: act.battles_won,
                level,
                rank: 0,
            });
        }
        drop(conn);

        rank(&mut entries);
        debug!(
            start_bucket,
            entries = entries.len(),
            "computed windowed leaderboard"
        );
        Ok(entries)
    }
}

/// Sort by rating then problems solved, both descending, and assign
/// 1-based ranks. Equal keys keep their relative order.
fn rank(entries: &mut [LeaderboardEntry]) {
    entries.sort_by_key(|e| (-e.rating, std::cmp::Reverse(e.problems_solved)));
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i as u32 + 1;
    }
}
