use crate::db::{format_sqlite_utc, Database, ExpiryKind, ExpiryRecord, NewModlogEntry};
use crate::error::StorageError;
use chrono::{DateTime, Utc};

type Result<T> = std::result::Result<T, StorageError>;

/// Async facade over the scheduled expiry store.
#[derive(Clone)]
pub struct ExpiryService {
    db: Database,
}

impl ExpiryService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records the case and schedules its expiry atomically. Earlier pending
    /// expiries of the same kind for this user are superseded.
    pub async fn record_with_expiry(
        &self,
        entry: NewModlogEntry,
        kind: ExpiryKind,
        expires_at: DateTime<Utc>,
    ) -> Result<i64> {
        let expires_at = format_sqlite_utc(expires_at);
        self.db
            .run_blocking(move |db| db.append_modlog_with_expiry(&entry, kind, &expires_at))
            .await
    }

    pub async fn get_due(&self, limit: usize) -> Result<Vec<ExpiryRecord>> {
        self.db
            .run_blocking(move |db| db.get_due_expiries(limit))
            .await
    }

    /// Pending expiries, due or not.
    pub async fn pending(&self) -> Result<u64> {
        self.db
            .run_blocking(|db| db.count_pending_expiries())
            .await
    }

    pub async fn mark_done(&self, id: i64) -> Result<()> {
        self.db
            .run_blocking(move |db| db.mark_expiry_done(id))
            .await
    }

    pub async fn cancel(&self, kind: ExpiryKind, guild_id: u64, user_id: u64) -> Result<usize> {
        self.db
            .run_blocking(move |db| db.cancel_expiries(kind, guild_id, user_id))
            .await
    }
}
