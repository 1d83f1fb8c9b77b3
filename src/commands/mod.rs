pub mod admin;
pub mod automod;
pub mod moderation;
pub mod modlog;
pub mod setup;

use crate::{Context, Error};

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![
        automod::automod(),
        setup::setup(),
        modlog::modlog(),
        moderation::ban(),
        moderation::unban(),
        moderation::kick(),
        moderation::warn(),
        moderation::timeout(),
        moderation::untimeout(),
        moderation::tempban(),
        moderation::voicemute(),
        moderation::voiceunmute(),
        admin::shutdown(),
    ]
}

/// Guild ID of the invoking context. Every moderation command is `guild_only`.
pub(crate) fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    Ok(ctx.guild_id().ok_or("Must be run in a guild")?.get())
}
