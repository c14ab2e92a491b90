//! Database module for the relay
//!
//! Flat, append-only log of every inbound and outgoing chat message.

mod schema;

pub use schema::*;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    Poisoned,
    #[error("Corrupt row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
///
/// The connection lock is held for a single statement at a time, so writes
/// from unrelated conversations never wait on each other's network calls.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    conn: Connection,
    /// Last timestamp handed out; issued timestamps never go backwards
    last_timestamp: Option<DateTime<Utc>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        let last_timestamp = latest_timestamp(&conn)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                last_timestamp,
            })),
        })
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| DbError::Poisoned)
    }

    /// Append a message. The store assigns id and timestamp.
    pub fn append(&self, message: &NewMessage) -> DbResult<Message> {
        self.append_at(message, Utc::now())
    }

    /// Append with `clock` as the current time.
    ///
    /// The issued timestamp is the later of `clock` and one microsecond past
    /// the previous write, taken under the lock, so timestamp order matches
    /// insertion order even if the wall clock steps backwards.
    fn append_at(&self, message: &NewMessage, clock: DateTime<Utc>) -> DbResult<Message> {
        let mut inner = self.lock()?;
        let clock = clock.trunc_subsecs(6);
        let now = match inner.last_timestamp {
            Some(last) if clock <= last => last + Duration::microseconds(1),
            _ => clock,
        };

        inner.conn.execute(
            "INSERT INTO messages (recipient, sender, message_text, timestamp, direction)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.recipient,
                message.sender,
                message.message_text,
                format_timestamp(&now),
                message.direction.as_str(),
            ],
        )?;

        inner.last_timestamp = Some(now);

        Ok(Message {
            id: inner.conn.last_insert_rowid(),
            recipient: message.recipient.clone(),
            sender: message.sender.clone(),
            message_text: message.message_text.clone(),
            timestamp: now,
            direction: message.direction,
        })
    }

    /// Messages where `party` is either sender or recipient, newest first
    pub fn list_by_recipient(&self, party: &str, limit: usize) -> DbResult<Vec<Message>> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT id, recipient, sender, message_text, timestamp, direction
             FROM messages
             WHERE recipient = ?1 OR sender = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![party, limit], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                recipient: row.get(1)?,
                sender: row.get(2)?,
                message_text: row.get(3)?,
                timestamp: row.get(4)?,
                direction: row.get(5)?,
            })
        })?;

        rows.map(|row| row.map_err(DbError::from).and_then(RawRow::into_message))
            .collect()
    }

    /// Total number of stored messages
    pub fn count(&self) -> DbResult<i64> {
        let inner = self.lock()?;
        inner
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .map_err(DbError::from)
    }
}

/// Newest stored timestamp, so a reopened store keeps issuing later ones
fn latest_timestamp(conn: &Connection) -> DbResult<Option<DateTime<Utc>>> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, timestamp FROM messages ORDER BY timestamp DESC, id DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(id, ts)| parse_timestamp(id, &ts)).transpose()
}

fn parse_timestamp(id: i64, raw: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt {
            id,
            reason: format!("bad timestamp: {e}"),
        })
}

struct RawRow {
    id: i64,
    recipient: String,
    sender: String,
    message_text: String,
    timestamp: String,
    direction: String,
}

impl RawRow {
    fn into_message(self) -> DbResult<Message> {
        let direction = match self.direction.as_str() {
            "incoming" => Direction::Incoming,
            "outgoing" => Direction::Outgoing,
            other => {
                return Err(DbError::Corrupt {
                    id: self.id,
                    reason: format!("unknown direction {other:?}"),
                })
            }
        };
        let timestamp = parse_timestamp(self.id, &self.timestamp)?;

        Ok(Message {
            id: self.id,
            recipient: self.recipient,
            sender: self.sender,
            message_text: self.message_text,
            timestamp,
            direction,
        })
    }
}

/// Fixed-width UTC form so lexical order equals chronological order
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
