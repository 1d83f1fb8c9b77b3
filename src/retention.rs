use crate::db::Database;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Periodically deletes modlog entries older than `retention_days`.
pub async fn start_cleanup_task(db: Database, retention_days: u64, interval_secs: u64) {
    info!(
        "Starting modlog retention task: keeping {} days, sweeping every {}s",
        retention_days, interval_secs
    );
    let mut ticker = interval(Duration::from_secs(interval_secs.max(60)));

    loop {
        ticker.tick().await;
        match sweep(&db, retention_days).await {
            Ok(0) => debug!("Modlog retention: nothing to purge"),
            Ok(count) => info!("Modlog retention: purged {} entries", count),
            Err(e) => warn!("Modlog retention error: {}", e),
        }
    }
}

async fn sweep(db: &Database, retention_days: u64) -> anyhow::Result<usize> {
    let count = db
        .run_blocking(move |db| db.purge_all_modlog_older_than(retention_days))
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_db, NewModlogEntry};

    #[tokio::test]
    async fn test_sweep_keeps_recent_entries() {
        let db = test_db();
        db.append_modlog(&NewModlogEntry::new(1, 2, 3, "ban")).unwrap();
        db.append_modlog(&NewModlogEntry::new(1, 2, 3, "unban")).unwrap();
        assert_eq!(sweep(&db, 30).await.unwrap(), 0);
        assert_eq!(db.get_guild_modlog(1, 10).unwrap().len(), 2);
    }
}
