use crate::config::Config;
use crate::error::StorageError;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub mod expiries;
pub mod modlog;
pub mod settings;

pub use expiries::{ExpiryKind, ExpiryRecord};
pub use modlog::{ModlogEntry, NewModlogEntry};
pub use settings::{AutoModAction, Detector, Feature, GuildSettings};

pub type Result<T> = std::result::Result<T, StorageError>;

/// SQLite datetime text format used by every timestamp column.
pub const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(&config.database_url).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::InvalidData(format!("cannot create {parent:?}: {e}")))?;
            }
        }
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> Result<()> {
        info!("Database: Initializing schema...");
        let sql = "
            CREATE TABLE IF NOT EXISTS modlog (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                moderator_id TEXT NOT NULL,
                action TEXT NOT NULL,
                reason TEXT,
                duration TEXT,
                timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                case_id INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_modlog_guild ON modlog (guild_id);
            CREATE INDEX IF NOT EXISTS idx_modlog_user ON modlog (user_id);
            CREATE INDEX IF NOT EXISTS idx_modlog_timestamp ON modlog (timestamp);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_modlog_guild_case ON modlog (guild_id, case_id);

            CREATE TABLE IF NOT EXISTS guild_settings (
                guild_id TEXT PRIMARY KEY,
                automod_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                antispam_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                antispam_threshold INTEGER NOT NULL DEFAULT 5,
                antispam_action TEXT NOT NULL DEFAULT 'delete',
                anticaps_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                anticaps_threshold INTEGER NOT NULL DEFAULT 70,
                anticaps_action TEXT NOT NULL DEFAULT 'delete',
                antilinks_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                antilinks_action TEXT NOT NULL DEFAULT 'delete',
                antiinvite_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                antiinvite_action TEXT NOT NULL DEFAULT 'delete',
                wordfilter_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                wordfilter_action TEXT NOT NULL DEFAULT 'delete',
                wordfilter_words TEXT NOT NULL DEFAULT '[]',
                massmention_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                massmention_threshold INTEGER NOT NULL DEFAULT 5,
                massmention_action TEXT NOT NULL DEFAULT 'delete',
                modlog_channel_id TEXT,
                welcome_channel_id TEXT,
                prefix TEXT NOT NULL DEFAULT '!',
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS expiries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                guild_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                case_id INTEGER NOT NULL,
                expires_at DATETIME NOT NULL,
                done BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_expiries_due ON expiries (done, expires_at);
        ";
        let conn = self.conn()?;
        conn.execute_batch(sql)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs a synchronous database closure on the blocking thread pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

pub fn parse_sqlite_utc(ts: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(ts, SQLITE_DATETIME_FORMAT).ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

pub fn format_sqlite_utc(ts: DateTime<Utc>) -> String {
    ts.format(SQLITE_DATETIME_FORMAT).to_string()
}

#[cfg(test)]
pub(crate) fn test_db() -> Database {
    let db = Database::open(":memory:").unwrap();
    db.execute_init().unwrap();
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let db = test_db();
        db.execute_init().unwrap();

        let conn = db.conn().unwrap();
        for table in ["modlog", "guild_settings", "expiries"] {
            let exists = conn
                .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")
                .unwrap()
                .exists([table])
                .unwrap();
            assert!(exists, "missing table {table}");
        }
    }

    #[test]
    fn test_sqlite_timestamp_roundtrip() {
        let parsed = parse_sqlite_utc("2026-01-01 12:30:00").unwrap();
        assert_eq!(format_sqlite_utc(parsed), "2026-01-01 12:30:00");
        assert!(parse_sqlite_utc("not a date").is_none());
    }

    #[tokio::test]
    async fn test_run_blocking_propagates_errors() {
        let db = test_db();
        let result: Result<()> = db
            .run_blocking(|_| Err(StorageError::InvalidData("boom".to_string())))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidData(_))));
    }
}
