//! # Engagement ledger
//!
//! Append-only storage for visits, poll votes, quiz answers and feedback.
//!
//! Duplicate and rate rules are enforced here, inside the same transaction as
//! the insert:
//!
//! | Record       | Rule                                                     |
//! |--------------|----------------------------------------------------------|
//! | visit        | none                                                     |
//! | poll vote    | one per (tenant, page, poll, identity), unique index     |
//! | quiz answer  | none, or one per (tenant, page, quiz, identity) if asked |
//! | feedback     | `limit` per (tenant, identity, day)                      |
//!
//! `AlreadyVoted`/`RateLimited` are only ever reported after SQLite answered.
//! Busy/locked databases surface as [`LedgerError::Transient`], never as a
//! rejection.
use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, TransactionBehavior, params};
use serde::Serialize;
use thiserror::Error;

use crate::{
    database::{TABLES, init_sqlite, init_sqlite_in_memory},
    geo::Location,
    identity::PseudoIdentity,
};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Unknown candidate {0}")]
    UnknownTenant(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Already voted")]
    AlreadyVoted,

    #[error("Already answered")]
    AlreadyAnswered,

    #[error("Daily limit of {limit} reached")]
    RateLimited { limit: u32 },

    #[error("Storage temporarily unavailable: {0}")]
    Transient(String),

    #[error("Storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("Ledger task failed: {0}")]
    Task(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Transient(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                LedgerError::Transient(error.to_string())
            }
            _ => LedgerError::Storage(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Tenant(String),
    All,
}

impl Scope {
    pub fn tenant(slug: &str) -> Self {
        Scope::Tenant(slug.to_string())
    }

    pub(crate) fn slug(&self) -> Option<&str> {
        match self {
            Scope::Tenant(slug) => Some(slug),
            Scope::All => None,
        }
    }
}

/// Fields every record kind carries.
#[derive(Debug, Clone)]
pub struct Stamp {
    pub at: DateTime<Utc>,
    pub tenant: String,
    pub page: String,
    pub location: Location,
    pub identity: PseudoIdentity,
}

impl Stamp {
    pub fn day(&self) -> NaiveDate {
        self.at.date_naive()
    }

    fn ts(&self) -> String {
        self.at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone)]
pub struct VisitRecord {
    pub stamp: Stamp,
    pub user_agent: String,
    pub referrer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PollVoteRecord {
    pub stamp: Stamp,
    pub poll_id: String,
    pub option: String,
}

#[derive(Debug, Clone)]
pub struct QuizAnswerRecord {
    pub stamp: Stamp,
    pub quiz_id: String,
    pub option: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone)]
pub struct FeedbackRecord {
    pub stamp: Stamp,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetCounts {
    pub visits: usize,
    pub poll_votes: usize,
    pub quiz_answers: usize,
    pub feedback: usize,
}

#[derive(Clone)]
pub struct Ledger {
    conn: Arc<Mutex<Connection>>,
}

impl Ledger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Ok(Self::from_connection(init_sqlite(path.as_ref())?))
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        Ok(Self::from_connection(init_sqlite_in_memory()?))
    }

    fn from_connection(connection: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(connection)),
        }
    }

    // a panic mid-transaction already rolled back when the guard dropped
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append_visit(&self, visit: &VisitRecord) -> Result<i64, LedgerError> {
        let conn = self.lock();
        let stamp = &visit.stamp;

        conn.execute(
            "INSERT INTO visits (ts, day, tenant, page, city, region, country, identity,
                                 user_agent, referrer)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                stamp.ts(),
                day_key(stamp.day()),
                stamp.tenant,
                stamp.page,
                stamp.location.city,
                stamp.location.region,
                stamp.location.country,
                stamp.identity.as_str(),
                visit.user_agent,
                visit.referrer,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn append_poll_vote(&self, vote: &PollVoteRecord) -> Result<i64, LedgerError> {
        let conn = self.lock();
        let stamp = &vote.stamp;

        let inserted = conn.execute(
            "INSERT INTO poll_votes (ts, day, tenant, page, poll_id, option, city, region,
                                     country, identity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                stamp.ts(),
                day_key(stamp.day()),
                stamp.tenant,
                stamp.page,
                vote.poll_id,
                vote.option,
                stamp.location.city,
                stamp.location.region,
                stamp.location.country,
                stamp.identity.as_str(),
            ],
        );

        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                Err(LedgerError::AlreadyVoted)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn append_quiz_answer(
        &self,
        answer: &QuizAnswerRecord,
        unique: bool,
    ) -> Result<i64, LedgerError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stamp = &answer.stamp;

        if unique {
            let previous: i64 = tx.query_row(
                "SELECT COUNT(*) FROM quiz_answers
                 WHERE tenant = ?1 AND page = ?2 AND quiz_id = ?3 AND identity = ?4",
                params![stamp.tenant, stamp.page, answer.quiz_id, stamp.identity.as_str()],
                |row| row.get(0),
            )?;

            if previous > 0 {
                return Err(LedgerError::AlreadyAnswered);
            }
        }

        tx.execute(
            "INSERT INTO quiz_answers (ts, day, tenant, page, quiz_id, option, is_correct,
                                       city, region, country, identity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                stamp.ts(),
                day_key(stamp.day()),
                stamp.tenant,
                stamp.page,
                answer.quiz_id,
                answer.option,
                answer.is_correct,
                stamp.location.city,
                stamp.location.region,
                stamp.location.country,
                stamp.identity.as_str(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(id)
    }

    /// Returns how many messages this identity has left today.
    pub fn append_feedback(
        &self,
        feedback: &FeedbackRecord,
        daily_limit: u32,
    ) -> Result<u32, LedgerError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stamp = &feedback.stamp;
        let day = day_key(stamp.day());

        let sent: u32 = tx.query_row(
            "SELECT COUNT(*) FROM feedback WHERE tenant = ?1 AND identity = ?2 AND day = ?3",
            params![stamp.tenant, stamp.identity.as_str(), day],
            |row| row.get(0),
        )?;

        if sent >= daily_limit {
            return Err(LedgerError::RateLimited { limit: daily_limit });
        }

        tx.execute(
            "INSERT INTO feedback (ts, day, tenant, page, message, city, region, country, identity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                stamp.ts(),
                day,
                stamp.tenant,
                stamp.page,
                feedback.message,
                stamp.location.city,
                stamp.location.region,
                stamp.location.country,
                stamp.identity.as_str(),
            ],
        )?;

        tx.commit()?;
        Ok(daily_limit - sent - 1)
    }

    /// Irreversibly deletes every record in scope.
    pub fn reset(&self, scope: &Scope) -> Result<ResetCounts, LedgerError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut deleted = [0usize; 4];
        for (count, table) in deleted.iter_mut().zip(TABLES) {
            *count = tx.execute(
                &format!("DELETE FROM {table} WHERE ?1 IS NULL OR tenant = ?1"),
                params![scope.slug()],
            )?;
        }

        tx.commit()?;

        let [visits, poll_votes, quiz_answers, feedback] = deleted;
        Ok(ResetCounts {
            visits,
            poll_votes,
            quiz_answers,
            feedback,
        })
    }

    pub(crate) fn read<T>(
        &self,
        query: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, LedgerError> {
        Ok(query(&self.lock())?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::identity::{Salt, derive};

    pub(crate) fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, hour, 0, 0).unwrap()
    }

    pub(crate) fn identity(who: &str, at: DateTime<Utc>) -> PseudoIdentity {
        derive(who, at.date_naive(), &Salt::new("test-salt").unwrap())
    }

    pub(crate) fn stamp(tenant: &str, page: &str, who: &str, at: DateTime<Utc>) -> Stamp {
        Stamp {
            at,
            tenant: tenant.to_string(),
            page: page.to_string(),
            location: Location::unknown(),
            identity: identity(who, at),
        }
    }

    pub(crate) fn vote(tenant: &str, who: &str, option: &str, at: DateTime<Utc>) -> PollVoteRecord {
        PollVoteRecord {
            stamp: stamp(tenant, "kinder", who, at),
            poll_id: "p1".to_string(),
            option: option.to_string(),
        }
    }

    pub(crate) fn feedback(
        tenant: &str,
        page: &str,
        who: &str,
        at: DateTime<Utc>,
    ) -> FeedbackRecord {
        FeedbackRecord {
            stamp: stamp(tenant, page, who, at),
            message: "Mehr Radwege bitte".to_string(),
        }
    }

    pub(crate) fn quiz(
        tenant: &str,
        who: &str,
        option: &str,
        correct: bool,
        at: DateTime<Utc>,
    ) -> QuizAnswerRecord {
        QuizAnswerRecord {
            stamp: stamp(tenant, "kinder", who, at),
            quiz_id: "q1".to_string(),
            option: option.to_string(),
            is_correct: correct,
        }
    }

    pub(crate) fn visit(tenant: &str, page: &str, who: &str, at: DateTime<Utc>) -> VisitRecord {
        VisitRecord {
            stamp: stamp(tenant, page, who, at),
            user_agent: "Mozilla/5.0".to_string(),
            referrer: None,
        }
    }

    fn count(ledger: &Ledger, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        ledger
            .read(|conn| conn.query_row(&sql, [], |row| row.get(0)))
            .unwrap()
    }

    #[test]
    fn test_second_vote_rejected() {
        let ledger = Ledger::in_memory().unwrap();

        ledger.append_poll_vote(&vote("kandidat-a", "h1", "A", at(1, 9))).unwrap();
        let second = ledger.append_poll_vote(&vote("kandidat-a", "h1", "B", at(1, 10)));

        assert!(matches!(second, Err(LedgerError::AlreadyVoted)));
        assert_eq!(count(&ledger, "poll_votes"), 1);
    }

    #[test]
    fn test_vote_scoped_by_tenant_and_identity() {
        let ledger = Ledger::in_memory().unwrap();

        ledger.append_poll_vote(&vote("kandidat-a", "h1", "A", at(1, 9))).unwrap();
        ledger.append_poll_vote(&vote("kandidat-b", "h1", "A", at(1, 9))).unwrap();
        ledger.append_poll_vote(&vote("kandidat-a", "h2", "B", at(1, 9))).unwrap();
        // the identity rotates, so the same address may vote again tomorrow
        ledger.append_poll_vote(&vote("kandidat-a", "h1", "C", at(2, 9))).unwrap();

        assert_eq!(count(&ledger, "poll_votes"), 4);
    }

    #[test]
    fn test_feedback_daily_limit() {
        let ledger = Ledger::in_memory().unwrap();

        let remaining: Vec<u32> = ["kinder", "umwelt", "home"]
            .into_iter()
            .map(|page| {
                let record = feedback("kandidat-a", page, "h3", at(1, 9));
                ledger.append_feedback(&record, 3).unwrap()
            })
            .collect();
        assert_eq!(remaining, [2, 1, 0]);

        let fourth = ledger.append_feedback(&feedback("kandidat-a", "kinder", "h3", at(1, 20)), 3);
        assert!(matches!(fourth, Err(LedgerError::RateLimited { limit: 3 })));
        assert_eq!(count(&ledger, "feedback"), 3);

        // other candidates keep their own allowance
        ledger.append_feedback(&feedback("kandidat-b", "kinder", "h3", at(1, 21)), 3).unwrap();

        // next day
        ledger.append_feedback(&feedback("kandidat-a", "kinder", "h3", at(2, 9)), 3).unwrap();
    }

    #[test]
    fn test_feedback_limit_zero_rejects_everything() {
        let ledger = Ledger::in_memory().unwrap();
        let result = ledger.append_feedback(&feedback("kandidat-a", "kinder", "h3", at(1, 9)), 0);

        assert!(matches!(result, Err(LedgerError::RateLimited { limit: 0 })));
    }

    #[test]
    fn test_quiz_resubmission_allowed_by_default() {
        let ledger = Ledger::in_memory().unwrap();

        ledger.append_quiz_answer(&quiz("kandidat-a", "h1", "1", false, at(1, 9)), false).unwrap();
        ledger.append_quiz_answer(&quiz("kandidat-a", "h1", "2", true, at(1, 9)), false).unwrap();

        assert_eq!(count(&ledger, "quiz_answers"), 2);
    }

    #[test]
    fn test_quiz_resubmission_rejected_when_unique() {
        let ledger = Ledger::in_memory().unwrap();

        ledger.append_quiz_answer(&quiz("kandidat-a", "h1", "1", false, at(1, 9)), true).unwrap();
        let resubmitted = quiz("kandidat-a", "h1", "2", true, at(1, 9));
        let second = ledger.append_quiz_answer(&resubmitted, true);

        assert!(matches!(second, Err(LedgerError::AlreadyAnswered)));
        assert_eq!(count(&ledger, "quiz_answers"), 1);
    }

    #[test]
    fn test_reset_tenant_only() {
        let ledger = Ledger::in_memory().unwrap();

        for tenant in ["kandidat-a", "kandidat-b"] {
            ledger.append_visit(&visit(tenant, "home", "h1", at(1, 9))).unwrap();
            ledger.append_poll_vote(&vote(tenant, "h1", "A", at(1, 9))).unwrap();
            ledger.append_quiz_answer(&quiz(tenant, "h1", "2", true, at(1, 9)), false).unwrap();
            ledger.append_feedback(&feedback(tenant, "home", "h1", at(1, 9)), 3).unwrap();
        }

        let deleted = ledger.reset(&Scope::tenant("kandidat-a")).unwrap();
        assert_eq!(
            deleted,
            ResetCounts {
                visits: 1,
                poll_votes: 1,
                quiz_answers: 1,
                feedback: 1
            }
        );
        for table in TABLES {
            assert_eq!(count(&ledger, table), 1, "{table}");
        }

        let deleted = ledger.reset(&Scope::All).unwrap();
        assert_eq!(deleted.visits, 1);
        for table in TABLES {
            assert_eq!(count(&ledger, table), 0, "{table}");
        }
    }

    #[test]
    fn test_day_uses_utc() {
        let s = stamp("kandidat-a", "home", "h1", at(1, 23));

        assert_eq!(day_key(s.day()), "2026-05-01");
        assert_eq!(s.ts(), "2026-05-01T23:00:00Z");
    }

    #[test]
    fn test_busy_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );

        assert!(LedgerError::from(busy).is_retryable());
        assert!(!LedgerError::AlreadyVoted.is_retryable());
    }
}
