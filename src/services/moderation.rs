use crate::automod::ModerationActions;
use crate::db::{Database, GuildSettings, ModlogEntry, NewModlogEntry};
use crate::error::StorageError;
use poise::serenity_prelude::{ChannelId, CreateEmbed};
use tracing::warn;

type Result<T> = std::result::Result<T, StorageError>;

/// Async facade over the settings and modlog stores.
#[derive(Clone)]
pub struct ModerationService {
    db: Database,
}

impl ModerationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn settings(&self, guild_id: u64) -> Result<Option<GuildSettings>> {
        self.db
            .run_blocking(move |db| db.get_guild_settings(guild_id))
            .await
    }

    /// Stored settings, or the defaults for a guild with no row. Never writes.
    pub async fn settings_or_defaults(&self, guild_id: u64) -> Result<GuildSettings> {
        Ok(self
            .settings(guild_id)
            .await?
            .unwrap_or_else(|| GuildSettings::new(guild_id)))
    }

    pub async fn ensure_settings(&self, guild_id: u64) -> Result<GuildSettings> {
        self.db
            .run_blocking(move |db| db.ensure_guild_settings(guild_id))
            .await
    }

    /// Loads (or materializes) the guild's settings, applies `change` and writes
    /// the full row back. Nothing is written if the upsert is rejected.
    pub async fn update_settings<F>(&self, guild_id: u64, change: F) -> Result<GuildSettings>
    where
        F: FnOnce(&mut GuildSettings) + Send + 'static,
    {
        self.db
            .run_blocking(move |db| {
                let mut settings = db.ensure_guild_settings(guild_id)?;
                change(&mut settings);
                db.upsert_guild_settings(&settings)?;
                Ok(settings)
            })
            .await
    }

    pub async fn record(&self, entry: NewModlogEntry) -> Result<i64> {
        self.db
            .run_blocking(move |db| db.append_modlog(&entry))
            .await
    }

    pub async fn case(&self, guild_id: u64, case_id: i64) -> Result<Option<ModlogEntry>> {
        self.db
            .run_blocking(move |db| db.get_modlog_case(guild_id, case_id))
            .await
    }

    pub async fn user_history(
        &self,
        guild_id: u64,
        user_id: u64,
        limit: usize,
    ) -> Result<Vec<ModlogEntry>> {
        self.db
            .run_blocking(move |db| db.get_user_modlog(guild_id, user_id, limit))
            .await
    }

    pub async fn guild_history(&self, guild_id: u64, limit: usize) -> Result<Vec<ModlogEntry>> {
        self.db
            .run_blocking(move |db| db.get_guild_modlog(guild_id, limit))
            .await
    }

    pub async fn purge_older_than(&self, guild_id: u64, age_days: u64) -> Result<usize> {
        self.db
            .run_blocking(move |db| db.purge_modlog_older_than(guild_id, age_days))
            .await
    }

    /// Posts to the guild's modlog channel if one is configured. Failures are logged, never returned.
    pub async fn notify(&self, actions: &dyn ModerationActions, guild_id: u64, embed: CreateEmbed) {
        let channel_id = match self.settings(guild_id).await {
            Ok(Some(settings)) => settings.modlog_channel_id,
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load settings for guild {}: {}", guild_id, e);
                None
            }
        };
        let Some(channel_id) = channel_id else {
            return;
        };
        if let Err(e) = actions.post_embed(ChannelId::new(channel_id), embed).await {
            warn!("Failed to post to modlog channel {}: {}", channel_id, e);
        }
    }
}
