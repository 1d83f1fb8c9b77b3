pub mod automod;
pub mod commands;
pub mod config;
pub mod db;
pub mod embeds;
pub mod error;
pub mod expiries;
pub mod retention;
pub mod services;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub moderation: services::moderation::ModerationService,
    pub expiries: services::expiry::ExpiryService,
    pub automod: automod::AutoModEvaluator,
    /// Bot's own user ID, recorded as the moderator of automatic cases
    pub bot_id: poise::serenity_prelude::UserId,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
