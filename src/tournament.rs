//! Tournament lifecycle - registration, scoring, prize payouts
//!
//! Tournaments carry fixed prize amounts configured at creation rather than
//! a pool derived from entry fees. Fees are debited at registration and the
//! configured prizes are paid to the top three standings at completion.

use std::sync::Arc;

use rusqlite::{params, Connection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::ArenaDb;
use crate::domain::{
    PrizeSplit, Tournament, TournamentConfig, TournamentParticipant, TournamentStatus, TxCategory,
};
use crate::error::{ArenaError, Result};
use crate::notify::WalletHub;
use crate::time_bucket::now_ms;
use crate::wallet::{apply_credit, apply_debit, bump_tournaments_won, load_wallet};

/// Manages tournament creation, registration, scoring and settlement
pub struct TournamentCoordinator {
    db: ArenaDb,
    hub: Arc<WalletHub>,
}

impl TournamentCoordinator {
    pub(crate) fn new(db: ArenaDb, hub: Arc<WalletHub>) -> Self {
        Self { db, hub }
    }

    /// Create a tournament in the `upcoming` state
    pub fn create(&self, config: &TournamentConfig) -> Result<Tournament> {
        if config.entry_fee < 0 {
            return Err(ArenaError::InvalidAmount(config.entry_fee));
        }
        let id = Uuid::new_v4().to_string();
        let now = now_ms();

        let conn = self.db.conn();
        conn.execute(
            r#"INSERT INTO tournaments
               (id, name, entry_fee, max_participants, status,
                prize_first, prize_second, prize_third, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                id,
                config.name,
                config.entry_fee,
                config.max_participants,
                TournamentStatus::Upcoming.as_str(),
                config.prizes.first,
                config.prizes.second,
                config.prizes.third,
                now,
            ],
        )?;
        let tournament = load_tournament(&conn, &id)?;
        drop(conn);

        info!(tournament_id = %tournament.id, name = %tournament.name, "created tournament");
        Ok(tournament)
    }

    /// Open registration for an upcoming tournament
    pub fn open_registration(&self, tournament_id: &str) -> Result<Tournament> {
        self.transition(tournament_id, TournamentStatus::Registration)
    }

    /// Start play. Registration closes.
    pub fn start(&self, tournament_id: &str) -> Result<Tournament> {
        self.transition(tournament_id, TournamentStatus::InProgress)
    }

    /// Register a user, debiting the entry fee. Rejected once the bracket
    /// is full, after play starts, or on repeat registration.
    pub fn register(&self, tournament_id: &str, user_id: &str) -> Result<Tournament> {
        let now = now_ms();
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;

        let tournament = load_tournament(&tx, tournament_id)?;
        if tournament.participant(user_id).is_some() {
            return Err(ArenaError::DuplicateRegistration(user_id.to_string()));
        }
        if tournament.is_full() {
            return Err(ArenaError::TournamentFull);
        }
        if !tournament.status.accepts_registration() {
            return Err(ArenaError::InvalidTransition {
                from: tournament.status.as_str().to_string(),
                to: "registered".to_string(),
            });
        }

        let wallet = if tournament.entry_fee > 0 {
            Some(apply_debit(
                &tx,
                user_id,
                tournament.entry_fee,
                TxCategory::TournamentEntry,
                "Tournament entry fee",
                Some(tournament_id),
            )?)
        } else {
            // Free tournaments still require an existing wallet
            load_wallet(&tx, user_id)?;
            None
        };
        tx.execute(
            r#"INSERT INTO tournament_participants
               (tournament_id, user_id, total_score, solved_challenges, registered_at)
               VALUES (?1, ?2, 0, 0, ?3)"#,
            params![tournament_id, user_id, now],
        )?;

        let tournament = load_tournament(&tx, tournament_id)?;
        tx.commit()?;
        drop(conn);

        info!(tournament_id, user_id, "registered for tournament");
        if let Some(wallet) = wallet {
            self.hub.publish(&wallet);
        }
        Ok(tournament)
    }

    /// Add points to a participant's running score, counting one more
    /// solved challenge
    pub fn update_score(&self, tournament_id: &str, user_id: &str, points: i64) -> Result<()> {
        let conn = self.db.conn();

        let tournament = load_tournament(&conn, tournament_id)?;
        if tournament.status != TournamentStatus::InProgress {
            return Err(ArenaError::InvalidTransition {
                from: tournament.status.as_str().to_string(),
                to: "scored".to_string(),
            });
        }

        let changed = conn.execute(
            r#"UPDATE tournament_participants
               SET total_score = total_score + ?1, solved_challenges = solved_challenges + 1
               WHERE tournament_id = ?2 AND user_id = ?3"#,
            params![points, tournament_id, user_id],
        )?;
        if changed == 0 {
            return Err(ArenaError::NotAParticipant(user_id.to_string()));
        }

        debug!(tournament_id, user_id, points, "tournament score updated");
        Ok(())
    }

    /// Current standings: total score descending, earlier registration
    /// breaks ties
    pub fn standings(&self, tournament_id: &str) -> Result<Vec<TournamentParticipant>> {
        let conn = self.db.conn();
        let tournament = load_tournament(&conn, tournament_id)?;
        Ok(ranked(tournament.participants))
    }

    /// Settle an in-progress tournament: pay the configured prizes to the
    /// top three standings and count a tournament win for first place.
    pub fn complete(&self, tournament_id: &str) -> Result<Tournament> {
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;

        let tournament = load_tournament(&tx, tournament_id)?;
        if tournament.status != TournamentStatus::InProgress {
            return Err(ArenaError::InvalidTransition {
                from: tournament.status.as_str().to_string(),
                to: TournamentStatus::Completed.as_str().to_string(),
            });
        }

        let standings = ranked(tournament.participants.clone());
        let mut paid = Vec::new();
        for (participant, prize) in standings.iter().zip(tournament.prizes.places()) {
            if prize > 0 {
                let wallet = apply_credit(
                    &tx,
                    &participant.user_id,
                    prize,
                    TxCategory::TournamentPrize,
                    "Tournament prize",
                    Some(tournament_id),
                )?;
                paid.push(wallet);
            }
        }
        if let Some(champion) = standings.first() {
            bump_tournaments_won(&tx, &champion.user_id)?;
        }
        tx.execute(
            "UPDATE tournaments SET status = ?1 WHERE id = ?2",
            params![TournamentStatus::Completed.as_str(), tournament_id],
        )?;

        let tournament = load_tournament(&tx, tournament_id)?;
        tx.commit()?;
        drop(conn);

        info!(
            tournament_id,
            winners = paid.len(),
            "tournament completed"
        );
        for wallet in &paid {
            self.hub.publish(wallet);
        }
        Ok(tournament)
    }

    /// Fetch a tournament with its participants
    pub fn get(&self, tournament_id: &str) -> Result<Tournament> {
        let conn = self.db.conn();
        load_tournament(&conn, tournament_id)
    }

    /// Move the tournament one step forward in its lifecycle. Regressions
    /// and repeats are rejected.
    fn transition(&self, tournament_id: &str, to: TournamentStatus) -> Result<Tournament> {
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;

        let tournament = load_tournament(&tx, tournament_id)?;
        if tournament.status.order() + 1 != to.order() {
            return Err(ArenaError::InvalidTransition {
                from: tournament.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        tx.execute(
            "UPDATE tournaments SET status = ?1 WHERE id = ?2",
            params![to.as_str(), tournament_id],
        )?;

        let tournament = load_tournament(&tx, tournament_id)?;
        tx.commit()?;

        info!(tournament_id, status = to.as_str(), "tournament transitioned");
        Ok(tournament)
    }
}

fn ranked(mut participants: Vec<TournamentParticipant>) -> Vec<TournamentParticipant> {
    participants.sort_by_key(|p| (-p.total_score, p.registered_at));
    participants
}

/// Load a tournament row with its participants, `TournamentNotFound` when
/// absent
fn load_tournament(conn: &Connection, tournament_id: &str) -> Result<Tournament> {
    let result = conn.query_row(
        r#"SELECT id, name, entry_fee, max_participants, status,
                  prize_first, prize_second, prize_third, created_at
           FROM tournaments WHERE id = ?1"#,
        [tournament_id],
        |row| {
            Ok(Tournament {
                id: row.get(0)?,
                name: row.get(1)?,
                entry_fee: row.get(2)?,
                max_participants: row.get(3)?,
                status: TournamentStatus::from_str(&row.get::<_, String>(4)?)
                    .unwrap_or(TournamentStatus::Upcoming),
                prizes: PrizeSplit {
                    first: row.get(5)?,
                    second: row.get(6)?,
                    third: row.get(7)?,
                },
                participants: Vec::new(),
                created_at: row.get(8)?,
            })
        },
    );
    let mut tournament = match result {
        Ok(t) => t,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(ArenaError::TournamentNotFound(tournament_id.to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut stmt = conn.prepare(
        r#"SELECT user_id, total_score, solved_challenges, registered_at
           FROM tournament_participants WHERE tournament_id = ?1 ORDER BY registered_at"#,
    )?;
    tournament.participants = stmt
        .query_map([tournament_id], |row| {
            Ok(TournamentParticipant {
                user_id: row.get(0)?,
                total_score: row.get(1)?,
                solved_challenges: row.get(2)?,
                registered_at: row.get(3)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(tournament)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::STARTING_BONUS;
    use crate::wallet::WalletManager;
    use tempfile::{tempdir, TempDir};

    struct Setup {
        _dir: TempDir,
        wallets: WalletManager,
        tournaments: TournamentCoordinator,
    }

    fn setup() -> Setup {
        let dir = tempdir().unwrap();
        let db = ArenaDb::open(&dir.path().join("arena.db")).unwrap();
        let hub = Arc::new(WalletHub::new());
        Setup {
            _dir: dir,
            wallets: WalletManager::new(db.clone(), hub.clone()),
            tournaments: TournamentCoordinator::new(db, hub),
        }
    }

    fn weekly_cup(entry_fee: i64, max_participants: u32) -> TournamentConfig {
        TournamentConfig {
            name: "Weekly Cup".to_string(),
            entry_fee,
            max_participants,
            prizes: PrizeSplit {
                first: 500,
                second: 250,
                third: 100,
            },
        }
    }

    fn users(s: &Setup, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| {
                let id = format!("user{i}");
                s.wallets.initialize(&id, &format!("User {i}")).unwrap();
                id
            })
            .collect()
    }

    #[test]
    fn test_lifecycle_is_monotonic() {
        let s = setup();
        let t = s.tournaments.create(&weekly_cup(0, 8)).unwrap();
        assert_eq!(t.status, TournamentStatus::Upcoming);

        // Cannot skip registration
        let err = s.tournaments.start(&t.id).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidTransition { .. }));

        let t2 = s.tournaments.open_registration(&t.id).unwrap();
        assert_eq!(t2.status, TournamentStatus::Registration);

        // No repeats, no regressions
        assert!(s.tournaments.open_registration(&t.id).is_err());

        let t3 = s.tournaments.start(&t.id).unwrap();
        assert_eq!(t3.status, TournamentStatus::InProgress);
    }

    #[test]
    fn test_register_debits_fee() {
        let s = setup();
        let ids = users(&s, 2);
        let t = s.tournaments.create(&weekly_cup(30, 8)).unwrap();
        s.tournaments.open_registration(&t.id).unwrap();

        let t = s.tournaments.register(&t.id, &ids[0]).unwrap();
        assert_eq!(t.participants.len(), 1);
        assert_eq!(s.wallets.get(&ids[0]).unwrap().coins, STARTING_BONUS - 30);

        // Repeat registration leaves the wallet alone
        let err = s.tournaments.register(&t.id, &ids[0]).unwrap_err();
        assert!(matches!(err, ArenaError::DuplicateRegistration(_)));
        assert_eq!(s.wallets.get(&ids[0]).unwrap().coins, STARTING_BONUS - 30);
    }

    #[test]
    fn test_ninth_registration_bounces_off_full_bracket() {
        let s = setup();
        let ids = users(&s, 9);
        let t = s.tournaments.create(&weekly_cup(10, 8)).unwrap();
        s.tournaments.open_registration(&t.id).unwrap();

        for id in &ids[..8] {
            s.tournaments.register(&t.id, id).unwrap();
        }

        let err = s.tournaments.register(&t.id, &ids[8]).unwrap_err();
        assert!(matches!(err, ArenaError::TournamentFull));
        assert_eq!(s.wallets.get(&ids[8]).unwrap().coins, STARTING_BONUS);
        assert_eq!(s.tournaments.get(&t.id).unwrap().participants.len(), 8);
    }

    #[test]
    fn test_registration_closes_at_start() {
        let s = setup();
        let ids = users(&s, 2);
        let t = s.tournaments.create(&weekly_cup(10, 8)).unwrap();
        s.tournaments.open_registration(&t.id).unwrap();
        s.tournaments.register(&t.id, &ids[0]).unwrap();
        s.tournaments.start(&t.id).unwrap();

        let err = s.tournaments.register(&t.id, &ids[1]).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidTransition { .. }));
    }

    #[test]
    fn test_scoring_and_standings() {
        let s = setup();
        let ids = users(&s, 3);
        let t = s.tournaments.create(&weekly_cup(0, 8)).unwrap();
        s.tournaments.open_registration(&t.id).unwrap();
        for id in &ids {
            s.tournaments.register(&t.id, id).unwrap();
        }

        // Scoring only while in progress
        let err = s.tournaments.update_score(&t.id, &ids[0], 10).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidTransition { .. }));

        s.tournaments.start(&t.id).unwrap();
        s.tournaments.update_score(&t.id, &ids[0], 10).unwrap();
        s.tournaments.update_score(&t.id, &ids[1], 30).unwrap();
        s.tournaments.update_score(&t.id, &ids[1], 10).unwrap();
        s.tournaments.update_score(&t.id, &ids[2], 20).unwrap();

        let err = s.tournaments.update_score(&t.id, "ghost", 5).unwrap_err();
        assert!(matches!(err, ArenaError::NotAParticipant(_)));

        let standings = s.tournaments.standings(&t.id).unwrap();
        let order: Vec<&str> = standings.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(order, vec![ids[1].as_str(), ids[2].as_str(), ids[0].as_str()]);
        assert_eq!(standings[0].total_score, 40);
        assert_eq!(standings[0].solved_challenges, 2);
    }

    #[test]
    fn test_completion_pays_top_three_once() {
        let s = setup();
        let ids = users(&s, 4);
        let t = s.tournaments.create(&weekly_cup(10, 8)).unwrap();
        s.tournaments.open_registration(&t.id).unwrap();
        for id in &ids {
            s.tournaments.register(&t.id, id).unwrap();
        }
        s.tournaments.start(&t.id).unwrap();

        s.tournaments.update_score(&t.id, &ids[0], 40).unwrap();
        s.tournaments.update_score(&t.id, &ids[1], 30).unwrap();
        s.tournaments.update_score(&t.id, &ids[2], 20).unwrap();
        s.tournaments.update_score(&t.id, &ids[3], 10).unwrap();

        let done = s.tournaments.complete(&t.id).unwrap();
        assert_eq!(done.status, TournamentStatus::Completed);

        let base = STARTING_BONUS - 10;
        assert_eq!(s.wallets.get(&ids[0]).unwrap().coins, base + 500);
        assert_eq!(s.wallets.get(&ids[1]).unwrap().coins, base + 250);
        assert_eq!(s.wallets.get(&ids[2]).unwrap().coins, base + 100);
        assert_eq!(s.wallets.get(&ids[3]).unwrap().coins, base);
        assert_eq!(s.wallets.get(&ids[0]).unwrap().achievements.tournaments_won, 1);
        assert_eq!(s.wallets.get(&ids[1]).unwrap().achievements.tournaments_won, 0);

        // Terminal: completing again pays nothing
        let err = s.tournaments.complete(&t.id).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidTransition { .. }));
        assert_eq!(s.wallets.get(&ids[0]).unwrap().coins, base + 500);
    }

    #[test]
    fn test_ties_break_on_registration_order() {
        let s = setup();
        let ids = users(&s, 2);
        let t = s.tournaments.create(&weekly_cup(0, 8)).unwrap();
        s.tournaments.open_registration(&t.id).unwrap();
        for id in &ids {
            s.tournaments.register(&t.id, id).unwrap();
        }
        // Force distinct registration times
        {
            let conn = s.tournaments.db.conn();
            conn.execute(
                "UPDATE tournament_participants SET registered_at = ?1 WHERE user_id = ?2",
                params![1000, ids[0]],
            )
            .unwrap();
            conn.execute(
                "UPDATE tournament_participants SET registered_at = ?1 WHERE user_id = ?2",
                params![2000, ids[1]],
            )
            .unwrap();
        }
        s.tournaments.start(&t.id).unwrap();
        s.tournaments.update_score(&t.id, &ids[0], 10).unwrap();
        s.tournaments.update_score(&t.id, &ids[1], 10).unwrap();

        let standings = s.tournaments.standings(&t.id).unwrap();
        assert_eq!(standings[0].user_id, ids[0]);
    }
}
