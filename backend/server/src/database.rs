//! # SQLite
//!
//! Durable store for the four engagement record kinds.
//!
//! ## Requirements
//!
//! - Append-only records, tagged with the candidate slug
//! - Check-and-append must be atomic per visitor identity
//! - Aggregates over a few hundred thousand rows per candidate
//!
//! ## Implementation
//!
//! - One table per record kind, `tenant` first in every index
//! - `day` (UTC, `YYYY-MM-DD`) stored next to the timestamp so daily windows
//!   are plain string comparisons
//! - Poll votes: unique index on (tenant, page, poll_id, identity), the
//!   database itself rejects a second vote
//! - Feedback and unique quiz answers: `BEGIN IMMEDIATE`, count, insert
//! - WAL so dashboard reads do not block visitors
use std::{path::Path, time::Duration};

use rusqlite::Connection;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS visits (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ts          TEXT    NOT NULL,
    day         TEXT    NOT NULL,
    tenant      TEXT    NOT NULL,
    page        TEXT    NOT NULL,
    city        TEXT    NOT NULL DEFAULT 'unknown',
    region      TEXT    NOT NULL DEFAULT 'unknown',
    country     TEXT    NOT NULL DEFAULT 'unknown',
    identity    TEXT    NOT NULL,
    user_agent  TEXT    NOT NULL DEFAULT '',
    referrer    TEXT
);

CREATE TABLE IF NOT EXISTS poll_votes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ts          TEXT    NOT NULL,
    day         TEXT    NOT NULL,
    tenant      TEXT    NOT NULL,
    page        TEXT    NOT NULL,
    poll_id     TEXT    NOT NULL,
    option      TEXT    NOT NULL,
    city        TEXT    NOT NULL DEFAULT 'unknown',
    region      TEXT    NOT NULL DEFAULT 'unknown',
    country     TEXT    NOT NULL DEFAULT 'unknown',
    identity    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS quiz_answers (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ts          TEXT    NOT NULL,
    day         TEXT    NOT NULL,
    tenant      TEXT    NOT NULL,
    page        TEXT    NOT NULL,
    quiz_id     TEXT    NOT NULL,
    option      TEXT    NOT NULL,
    is_correct  INTEGER NOT NULL DEFAULT 0,
    city        TEXT    NOT NULL DEFAULT 'unknown',
    region      TEXT    NOT NULL DEFAULT 'unknown',
    country     TEXT    NOT NULL DEFAULT 'unknown',
    identity    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS feedback (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ts          TEXT    NOT NULL,
    day         TEXT    NOT NULL,
    tenant      TEXT    NOT NULL,
    page        TEXT    NOT NULL,
    message     TEXT    NOT NULL,
    city        TEXT    NOT NULL DEFAULT 'unknown',
    region      TEXT    NOT NULL DEFAULT 'unknown',
    country     TEXT    NOT NULL DEFAULT 'unknown',
    identity    TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_visits_tenant_day     ON visits(tenant, day);
CREATE INDEX IF NOT EXISTS idx_visits_tenant_page    ON visits(tenant, page);
CREATE UNIQUE INDEX IF NOT EXISTS idx_poll_once      ON poll_votes(tenant, page, poll_id, identity);
CREATE INDEX IF NOT EXISTS idx_quiz_tenant_quiz ON quiz_answers(tenant, page, quiz_id, identity);
CREATE INDEX IF NOT EXISTS idx_feedback_tenant_ident ON feedback(tenant, identity, day);
CREATE INDEX IF NOT EXISTS idx_feedback_tenant_day   ON feedback(tenant, day);
"#;

pub const TABLES: [&str; 4] = ["visits", "poll_votes", "quiz_answers", "feedback"];

pub fn init_sqlite(path: &Path) -> rusqlite::Result<Connection> {
    let connection = Connection::open(path)?;

    connection.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
    prepare(&connection)?;

    Ok(connection)
}

pub fn init_sqlite_in_memory() -> rusqlite::Result<Connection> {
    let connection = Connection::open_in_memory()?;
    prepare(&connection)?;

    Ok(connection)
}

fn prepare(connection: &Connection) -> rusqlite::Result<()> {
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.execute_batch(SCHEMA)
}
