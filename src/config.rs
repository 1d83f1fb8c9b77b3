use crate::automod::MasterSwitch;
use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub application_id: u64,
    pub owner_id: Option<u64>,
    pub database_url: String,
    pub status_message: String,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,

    // Auto-moderation
    pub automod_master_switch: MasterSwitch,
    pub spam_tracker_capacity: usize,

    // Maintenance
    pub modlog_retention_days: u64,
    pub modlog_cleanup_interval_secs: u64,
    pub expiry_poll_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            application_id: env::var("APPLICATION_ID")
                .map_err(|_| anyhow::anyhow!("APPLICATION_ID must be set"))?
                .parse()
                .map_err(|_| anyhow::anyhow!("APPLICATION_ID must be a valid u64"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/moderation.db".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Keeping the peace".to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: env::var("REGISTER_COMMANDS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            automod_master_switch: match env::var("AUTOMOD_MASTER_SWITCH") {
                Ok(raw) => raw
                    .parse()
                    .map_err(|_| anyhow::anyhow!("AUTOMOD_MASTER_SWITCH must be 'ignore' or 'enforce'"))?,
                Err(_) => MasterSwitch::Ignore,
            },
            spam_tracker_capacity: env::var("SPAM_TRACKER_CAPACITY")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10000),
            modlog_retention_days: env::var("MODLOG_RETENTION_DAYS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            modlog_cleanup_interval_secs: env::var("MODLOG_CLEANUP_INTERVAL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .unwrap_or(86400),
            expiry_poll_interval_secs: env::var("EXPIRY_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("application_id", &self.application_id)
            .field("owner_id", &self.owner_id)
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("automod_master_switch", &self.automod_master_switch)
            .field("spam_tracker_capacity", &self.spam_tracker_capacity)
            .field("modlog_retention_days", &self.modlog_retention_days)
            .field(
                "modlog_cleanup_interval_secs",
                &self.modlog_cleanup_interval_secs,
            )
            .field(
                "expiry_poll_interval_secs",
                &self.expiry_poll_interval_secs,
            )
            .finish()
    }
}

/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;
