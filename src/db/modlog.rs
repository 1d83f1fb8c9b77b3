use super::{parse_sqlite_utc, Database, Result};
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

/// A persisted moderation case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModlogEntry {
    pub id: i64,
    pub case_id: i64,
    pub guild_id: u64,
    pub user_id: u64,
    pub moderator_id: u64,
    pub action: String,
    pub reason: Option<String>,
    pub duration: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// An entry about to be appended; `id`, `case_id` and `timestamp` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewModlogEntry {
    pub guild_id: u64,
    pub user_id: u64,
    pub moderator_id: u64,
    pub action: String,
    pub reason: Option<String>,
    pub duration: Option<String>,
}

impl NewModlogEntry {
    pub fn new(guild_id: u64, user_id: u64, moderator_id: u64, action: impl Into<String>) -> Self {
        Self {
            guild_id,
            user_id,
            moderator_id,
            action: action.into(),
            reason: None,
            duration: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }
}

const ENTRY_COLUMNS: &str =
    "id, case_id, guild_id, user_id, moderator_id, action, reason, duration, timestamp";

fn snowflake(row: &Row<'_>, column: &str) -> Result<u64> {
    let raw: String = row.get(column)?;
    raw.parse()
        .map_err(|_| StorageError::InvalidData(format!("invalid {column} '{raw}'")))
}

fn entry_from_row(row: &Row<'_>) -> Result<ModlogEntry> {
    let timestamp: String = row.get("timestamp")?;
    Ok(ModlogEntry {
        id: row.get("id")?,
        case_id: row.get("case_id")?,
        guild_id: snowflake(row, "guild_id")?,
        user_id: snowflake(row, "user_id")?,
        moderator_id: snowflake(row, "moderator_id")?,
        action: row.get("action")?,
        reason: row.get("reason")?,
        duration: row.get("duration")?,
        timestamp: parse_sqlite_utc(&timestamp)
            .ok_or_else(|| StorageError::InvalidData(format!("invalid timestamp '{timestamp}'")))?,
    })
}

/// Allocates the next case number and inserts the entry. Must run inside a transaction.
pub(super) fn insert_case(conn: &Connection, entry: &NewModlogEntry) -> Result<i64> {
    let guild_id = entry.guild_id.to_string();
    let case_id: i64 = conn.query_row(
        "SELECT COALESCE(MAX(case_id), 0) + 1 FROM modlog WHERE guild_id = ?1",
        [&guild_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO modlog (guild_id, user_id, moderator_id, action, reason, duration, case_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            guild_id,
            entry.user_id.to_string(),
            entry.moderator_id.to_string(),
            entry.action,
            entry.reason,
            entry.duration,
            case_id,
        ],
    )?;

    debug!(
        "Database: Appended case #{} ({}) in guild {}",
        case_id, entry.action, entry.guild_id
    );
    Ok(case_id)
}

impl Database {
    /// Appends an entry and returns its per-guild case number.
    ///
    /// The max lookup and the insert share one IMMEDIATE transaction, so case
    /// numbers stay dense even when several processes share the database file.
    pub fn append_modlog(&self, entry: &NewModlogEntry) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let case_id = insert_case(&tx, entry)?;
        tx.commit()?;
        Ok(case_id)
    }

    pub fn get_modlog_case(&self, guild_id: u64, case_id: i64) -> Result<Option<ModlogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM modlog WHERE guild_id = ?1 AND case_id = ?2"
        ))?;
        let row = stmt
            .query_row((guild_id.to_string(), case_id), |row| Ok(entry_from_row(row)))
            .optional()?;
        row.transpose()
    }

    /// Newest first.
    pub fn get_user_modlog(&self, guild_id: u64, user_id: u64, limit: usize) -> Result<Vec<ModlogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM modlog WHERE guild_id = ?1 AND user_id = ?2
             ORDER BY id DESC LIMIT ?3"
        ))?;
        let mut rows = stmt.query((guild_id.to_string(), user_id.to_string(), limit as i64))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(entry_from_row(row)?);
        }
        Ok(results)
    }

    /// Newest first.
    pub fn get_guild_modlog(&self, guild_id: u64, limit: usize) -> Result<Vec<ModlogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM modlog WHERE guild_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let mut rows = stmt.query((guild_id.to_string(), limit as i64))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(entry_from_row(row)?);
        }
        Ok(results)
    }

    /// Deletes a guild's entries older than `age_days`. Remaining case numbers are untouched.
    pub fn purge_modlog_older_than(&self, guild_id: u64, age_days: u64) -> Result<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM modlog WHERE guild_id = ?1 AND timestamp < datetime('now', ?2)",
            (guild_id.to_string(), format!("-{} days", age_days)),
        )?;
        Ok(count)
    }

    /// Retention sweep across every guild.
    pub fn purge_all_modlog_older_than(&self, age_days: u64) -> Result<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM modlog WHERE timestamp < datetime('now', ?1)",
            (format!("-{} days", age_days),),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use std::collections::BTreeSet;
    use std::thread;

    fn entry(guild_id: u64, user_id: u64, action: &str) -> NewModlogEntry {
        NewModlogEntry::new(guild_id, user_id, 1, action).reason("testing")
    }

    #[test]
    fn test_case_ids_are_per_guild() {
        let db = test_db();
        assert_eq!(db.append_modlog(&entry(10, 100, "ban")).unwrap(), 1);
        assert_eq!(db.append_modlog(&entry(10, 101, "kick")).unwrap(), 2);
        assert_eq!(db.append_modlog(&entry(20, 100, "ban")).unwrap(), 1);
        assert_eq!(db.append_modlog(&entry(10, 100, "timeout")).unwrap(), 3);

        let case = db.get_modlog_case(10, 2).unwrap().unwrap();
        assert_eq!(case.user_id, 101);
        assert_eq!(case.action, "kick");
        assert_eq!(case.reason.as_deref(), Some("testing"));
        assert!(db.get_modlog_case(20, 2).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_appends_are_dense() {
        let db = test_db();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let db = db.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|i| db.append_modlog(&entry(77, t * 100 + i, "warn")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        let unique: BTreeSet<i64> = all.iter().copied().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique, (1..=200).collect::<BTreeSet<i64>>());
    }

    #[test]
    fn test_history_is_newest_first_and_limited() {
        let db = test_db();
        for action in ["ban", "kick", "timeout"] {
            db.append_modlog(&entry(1, 5, action)).unwrap();
        }
        db.append_modlog(&entry(1, 6, "warn")).unwrap();

        let user = db.get_user_modlog(1, 5, 10).unwrap();
        let actions: Vec<_> = user.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["timeout", "kick", "ban"]);

        let guild = db.get_guild_modlog(1, 2).unwrap();
        let cases: Vec<_> = guild.iter().map(|e| e.case_id).collect();
        assert_eq!(cases, vec![4, 3]);
    }

    #[test]
    fn test_purge_keeps_numbering() {
        let db = test_db();
        for _ in 0..4 {
            db.append_modlog(&entry(9, 5, "warn")).unwrap();
        }
        db.append_modlog(&entry(8, 5, "warn")).unwrap();
        {
            let conn = db.conn().unwrap();
            conn.execute(
                "UPDATE modlog SET timestamp = datetime('now', '-120 days') WHERE case_id IN (1, 2)",
                [],
            )
            .unwrap();
        }

        let deleted = db.purge_modlog_older_than(9, 90).unwrap();
        assert_eq!(deleted, 2);
        assert!(db.get_modlog_case(9, 1).unwrap().is_none());
        assert_eq!(db.get_modlog_case(9, 3).unwrap().unwrap().case_id, 3);
        assert_eq!(db.get_modlog_case(9, 4).unwrap().unwrap().case_id, 4);

        // Guild 8's old entry survives a guild-9 purge.
        assert!(db.get_modlog_case(8, 1).unwrap().is_some());
        assert_eq!(db.append_modlog(&entry(9, 5, "warn")).unwrap(), 5);
    }

    #[test]
    fn test_purge_all_sweeps_every_guild() {
        let db = test_db();
        db.append_modlog(&entry(1, 5, "ban")).unwrap();
        db.append_modlog(&entry(2, 5, "ban")).unwrap();
        db.append_modlog(&entry(2, 6, "kick")).unwrap();
        {
            let conn = db.conn().unwrap();
            conn.execute(
                "UPDATE modlog SET timestamp = datetime('now', '-40 days') WHERE case_id = 1",
                [],
            )
            .unwrap();
        }
        assert_eq!(db.purge_all_modlog_older_than(30).unwrap(), 2);
        assert_eq!(db.get_guild_modlog(2, 10).unwrap().len(), 1);
    }
}
