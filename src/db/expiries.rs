use super::modlog::insert_case;
use super::{Database, NewModlogEntry, Result};
use crate::error::StorageError;
use rusqlite::{params, Row, TransactionBehavior};
use std::fmt;
use std::str::FromStr;

/// What happens when a scheduled expiry comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpiryKind {
    Unban,
    VoiceUnmute,
}

impl ExpiryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryKind::Unban => "unban",
            ExpiryKind::VoiceUnmute => "voiceunmute",
        }
    }
}

impl fmt::Display for ExpiryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpiryKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unban" => Ok(ExpiryKind::Unban),
            "voiceunmute" => Ok(ExpiryKind::VoiceUnmute),
            other => Err(StorageError::InvalidData(format!("unknown expiry kind '{other}'"))),
        }
    }
}

/// A pending expiry; `case_id` is the case that scheduled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryRecord {
    pub id: i64,
    pub kind: ExpiryKind,
    pub guild_id: u64,
    pub user_id: u64,
    pub case_id: i64,
}

fn record_from_row(row: &Row<'_>) -> Result<ExpiryRecord> {
    let kind: String = row.get("kind")?;
    let guild_id: String = row.get("guild_id")?;
    let user_id: String = row.get("user_id")?;
    Ok(ExpiryRecord {
        id: row.get("id")?,
        kind: kind.parse()?,
        guild_id: guild_id
            .parse()
            .map_err(|_| StorageError::InvalidData(format!("invalid guild_id '{guild_id}'")))?,
        user_id: user_id
            .parse()
            .map_err(|_| StorageError::InvalidData(format!("invalid user_id '{user_id}'")))?,
        case_id: row.get("case_id")?,
    })
}

const CANCEL_SQL: &str = "UPDATE expiries SET done = 1
     WHERE kind = ?1 AND guild_id = ?2 AND user_id = ?3 AND done = 0";

impl Database {
    #[cfg(test)]
    pub(crate) fn create_expiry(
        &self,
        kind: ExpiryKind,
        guild_id: u64,
        user_id: u64,
        case_id: i64,
        expires_at: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO expiries (kind, guild_id, user_id, case_id, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![kind.as_str(), guild_id.to_string(), user_id.to_string(), case_id, expires_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Appends the case and replaces any pending expiry of the same kind for the
    /// user in one transaction. Returns the new case number.
    pub fn append_modlog_with_expiry(
        &self,
        entry: &NewModlogEntry,
        kind: ExpiryKind,
        expires_at: &str,
    ) -> Result<i64> {
        let guild_id = entry.guild_id.to_string();
        let user_id = entry.user_id.to_string();
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let case_id = insert_case(&tx, entry)?;
        tx.execute(CANCEL_SQL, params![kind.as_str(), guild_id, user_id])?;
        tx.execute(
            "INSERT INTO expiries (kind, guild_id, user_id, case_id, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![kind.as_str(), guild_id, user_id, case_id, expires_at],
        )?;
        tx.commit()?;
        Ok(case_id)
    }

    pub fn get_due_expiries(&self, limit: usize) -> Result<Vec<ExpiryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, guild_id, user_id, case_id FROM expiries
             WHERE done = 0 AND expires_at <= datetime('now')
             ORDER BY expires_at ASC LIMIT ?1",
        )?;
        let mut rows = stmt.query([limit as i64])?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(record_from_row(row)?);
        }
        Ok(results)
    }

    pub fn count_pending_expiries(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM expiries WHERE done = 0", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn mark_expiry_done(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute("UPDATE expiries SET done = 1 WHERE id = ?1", [id])?;
        if updated == 0 {
            return Err(StorageError::InvalidData(format!("no expiry with id {id}")));
        }
        Ok(())
    }

    /// Drops pending expiries of one kind for a user, e.g. after a manual unban.
    pub fn cancel_expiries(&self, kind: ExpiryKind, guild_id: u64, user_id: u64) -> Result<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            CANCEL_SQL,
            params![kind.as_str(), guild_id.to_string(), user_id.to_string()],
        )?;
        Ok(count)
    }
}
