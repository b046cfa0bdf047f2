use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::AppError;

pub(crate) const BLACKLIST_DB_FILE: &str = "blacklist.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BlacklistRecord {
    pub(crate) user_id: String,
    pub(crate) ban_time: DateTime<Utc>,
    /// `None` means the entry never expires.
    pub(crate) expire_time: Option<DateTime<Utc>>,
    pub(crate) reason: String,
}

/// Handle to the blacklist table. Every call opens its own connection, so a
/// write is committed by the time the call returns and handles can be shared
/// freely between tasks.
#[derive(Debug, Clone)]
pub(crate) struct BlacklistStore {
    path: PathBuf,
}

impl BlacklistStore {
    /// Open (or create) the store at `path`. Safe to call on every startup.
    pub(crate) fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self { path };
        let conn = store.connect()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blacklist (
                user_id TEXT PRIMARY KEY,
                ban_time TEXT NOT NULL,
                expire_time TEXT,
                reason TEXT NOT NULL DEFAULT ''
            );",
        )?;
        debug!("Blacklist store ready at {}", store.path.display());
        Ok(store)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    pub(crate) fn get(&self, user_id: &str) -> Result<Option<BlacklistRecord>, AppError> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                "SELECT user_id, ban_time, expire_time, reason FROM blacklist WHERE user_id = ?1",
                params![user_id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Insert the record, replacing any existing entry for the same user.
    pub(crate) fn put(&self, record: &BlacklistRecord) -> Result<(), AppError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO blacklist (user_id, ban_time, expire_time, reason)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.user_id,
                format_timestamp(&record.ban_time),
                record.expire_time.as_ref().map(format_timestamp),
                record.reason,
            ],
        )?;
        Ok(())
    }

    /// Returns whether a row was removed.
    pub(crate) fn delete(&self, user_id: &str) -> Result<bool, AppError> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM blacklist WHERE user_id = ?1", params![user_id])?;
        Ok(removed > 0)
    }

    /// All records, newest first. Expired rows are included; rows that
    /// cannot be decoded are logged and skipped.
    pub(crate) fn list(&self) -> Result<Vec<BlacklistRecord>, AppError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT user_id, ban_time, expire_time, reason FROM blacklist")?;
        let mut records = Vec::new();
        for row in stmt.query_map([], row_to_record)? {
            match row {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable blacklist row: {e}"),
            }
        }
        // Older rows may carry other timestamp layouts, so text order is not time order.
        records.sort_by(|a, b| {
            b.ban_time
                .cmp(&a.ban_time)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(records)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<BlacklistRecord> {
    let ban_time: String = row.get(1)?;
    let expire_time: Option<String> = row.get(2)?;
    Ok(BlacklistRecord {
        user_id: row.get(0)?,
        ban_time: parse_timestamp(1, &ban_time)?,
        expire_time: expire_time
            .map(|ts| parse_timestamp(2, &ts))
            .transpose()?,
        reason: row.get(3)?,
    })
}

/// Naive layouts accepted on read, interpreted as UTC. The second is what
/// SQLite's own `CURRENT_TIMESTAMP` produces.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and offset-less ISO 8601.
fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw = raw.trim();
    let rfc3339_err = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => return Ok(ts.with_timezone(&Utc)),
        Err(e) => e,
    };
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(rfc3339_err))
        })
}
