use super::guild_id;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Configure server channels and prefix
#[poise::command(
    slash_command,
    subcommands("modlog", "welcome", "prefix"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn setup(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set or clear the channel that receives moderation logs
#[poise::command(slash_command)]
pub async fn modlog(
    ctx: Context<'_>,
    #[description = "Log channel (leave empty to disable)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let channel_id = channel.as_ref().map(|c| c.id.get());
    ctx.data()
        .moderation
        .update_settings(guild_id, move |s| s.modlog_channel_id = channel_id)
        .await?;

    match channel {
        Some(c) => ctx.say(format!("✅ Moderation logs will be posted in <#{}>.", c.id)).await?,
        None => ctx.say("✅ Moderation log channel cleared.").await?,
    };
    Ok(())
}

/// Set or clear the welcome channel
#[poise::command(slash_command)]
pub async fn welcome(
    ctx: Context<'_>,
    #[description = "Welcome channel (leave empty to disable)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let channel_id = channel.as_ref().map(|c| c.id.get());
    ctx.data()
        .moderation
        .update_settings(guild_id, move |s| s.welcome_channel_id = channel_id)
        .await?;

    match channel {
        Some(c) => ctx.say(format!("✅ Welcome channel set to <#{}>.", c.id)).await?,
        None => ctx.say("✅ Welcome channel cleared.").await?,
    };
    Ok(())
}

/// Set the legacy text-command prefix
#[poise::command(slash_command)]
pub async fn prefix(
    ctx: Context<'_>,
    #[description = "New prefix"]
    #[max_length = 5]
    prefix: String,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let Some(prefix) = validate_prefix(&prefix) else {
        ctx.say("❌ Prefix must be 1-5 characters with no spaces.").await?;
        return Ok(());
    };

    let stored = prefix.clone();
    ctx.data()
        .moderation
        .update_settings(guild_id, move |s| s.prefix = stored)
        .await?;
    ctx.say(format!("✅ Prefix set to `{}`.", prefix)).await?;
    Ok(())
}

pub fn validate_prefix(raw: &str) -> Option<String> {
    let prefix = raw.trim();
    let len = prefix.chars().count();
    if (1..=5).contains(&len) && !prefix.chars().any(char::is_whitespace) {
        Some(prefix.to_string())
    } else {
        None
    }
}
