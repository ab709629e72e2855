//! SQLite store
//!
//! A single connection behind a mutex serializes every operation, and each
//! multi-step mutation runs as one SQL transaction on top of it. WAL mode
//! keeps the file readable by external tooling while the engine holds the
//! connection.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    user_id             TEXT PRIMARY KEY,
    user_name           TEXT NOT NULL,
    coins               INTEGER NOT NULL DEFAULT 0,
    total_earned        INTEGER NOT NULL DEFAULT 0,
    total_spent         INTEGER NOT NULL DEFAULT 0,
    level               INTEGER NOT NULL DEFAULT 1,
    experience          INTEGER NOT NULL DEFAULT 0,
    streak_current      INTEGER NOT NULL DEFAULT 0,
    streak_longest      INTEGER NOT NULL DEFAULT 0,
    streak_last_active  TEXT,
    problems_solved     INTEGER NOT NULL DEFAULT 0,
    battles_won         INTEGER NOT NULL DEFAULT 0,
    tournaments_won     INTEGER NOT NULL DEFAULT 0,
    perfect_submissions INTEGER NOT NULL DEFAULT 0,
    badges              TEXT NOT NULL DEFAULT '[]',
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         TEXT NOT NULL,
    kind            TEXT NOT NULL,
    category        TEXT NOT NULL,
    amount          INTEGER NOT NULL,
    balance_before  INTEGER NOT NULL,
    balance_after   INTEGER NOT NULL,
    description     TEXT NOT NULL,
    reference_id    TEXT,
    created_at      INTEGER NOT NULL,
    day_bucket      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger(user_id, id);
CREATE INDEX IF NOT EXISTS idx_ledger_day ON ledger(day_bucket);

CREATE TABLE IF NOT EXISTS challenges (
    id          TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    difficulty  TEXT NOT NULL,
    category    TEXT NOT NULL,
    points      INTEGER NOT NULL,
    coin_reward INTEGER NOT NULL,
    is_daily    INTEGER NOT NULL DEFAULT 0,
    daily_date  TEXT
);
CREATE INDEX IF NOT EXISTS idx_challenges_daily ON challenges(is_daily, daily_date);

CREATE TABLE IF NOT EXISTS user_progress (
    user_id      TEXT PRIMARY KEY,
    total_points INTEGER NOT NULL DEFAULT 0,
    hints_used   TEXT NOT NULL DEFAULT '[]',
    created_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS solved_challenges (
    user_id       TEXT NOT NULL,
    challenge_id  TEXT NOT NULL,
    submission_id TEXT NOT NULL,
    solved_at     INTEGER NOT NULL,
    PRIMARY KEY (user_id, challenge_id)
);

CREATE TABLE IF NOT EXISTS submissions (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    challenge_id  TEXT NOT NULL,
    status        TEXT NOT NULL,
    language      TEXT NOT NULL,
    code          TEXT NOT NULL,
    tests_passed  INTEGER NOT NULL DEFAULT 0,
    tests_total   INTEGER NOT NULL DEFAULT 0,
    points_earned INTEGER NOT NULL DEFAULT 0,
    coins_earned  INTEGER NOT NULL DEFAULT 0,
    submitted_at  INTEGER NOT NULL,
    day_bucket    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_submissions_user ON submissions(user_id, submitted_at);
CREATE INDEX IF NOT EXISTS idx_submissions_day ON submissions(day_bucket, status);

CREATE TABLE IF NOT EXISTS battles (
    id               TEXT PRIMARY KEY,
    challenge_id     TEXT NOT NULL,
    entry_fee        INTEGER NOT NULL,
    prize_pool       INTEGER NOT NULL,
    max_participants INTEGER NOT NULL,
    duration_secs    INTEGER NOT NULL,
    status           TEXT NOT NULL,
    winner_id        TEXT,
    created_at       INTEGER NOT NULL,
    started_at       INTEGER,
    completed_at     INTEGER,
    day_bucket       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_battles_status ON battles(status, created_at);
CREATE INDEX IF NOT EXISTS idx_battles_winner ON battles(winner_id, day_bucket);

CREATE TABLE IF NOT EXISTS battle_participants (
    battle_id     TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    score         INTEGER,
    status        TEXT NOT NULL DEFAULT 'joined',
    submission_id TEXT,
    submitted_at  INTEGER,
    joined_at     INTEGER NOT NULL,
    PRIMARY KEY (battle_id, user_id)
);

CREATE TABLE IF NOT EXISTS tournaments (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    entry_fee        INTEGER NOT NULL,
    max_participants INTEGER NOT NULL,
    status           TEXT NOT NULL DEFAULT 'upcoming',
    prize_first      INTEGER NOT NULL DEFAULT 0,
    prize_second     INTEGER NOT NULL DEFAULT 0,
    prize_third      INTEGER NOT NULL DEFAULT 0,
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tournament_participants (
    tournament_id     TEXT NOT NULL,
    user_id           TEXT NOT NULL,
    total_score       INTEGER NOT NULL DEFAULT 0,
    solved_challenges INTEGER NOT NULL DEFAULT 0,
    registered_at     INTEGER NOT NULL,
    PRIMARY KEY (tournament_id, user_id)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

/// Handle to the arena database. Cloning shares the connection.
#[derive(Clone)]
pub struct ArenaDb {
    conn: Arc<Mutex<Connection>>,
}

impl ArenaDb {
    /// Open (or create) the database at the given path and ensure the
    /// schema exists
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_schema(&conn)?;

        info!(path = %path.display(), "opened arena database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, mainly for tests and tooling. No WAL: the
    /// journal pragma does not apply to memory databases.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the connection. Held for the duration of one operation.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?;
    if count == 0 {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
    }
    Ok(())
}
